//! Request gate for the Fitout web application
//!
//! Every page navigation is checked against the caller's session before it
//! reaches the page renderer: anonymous callers are sent to the login page,
//! signed-in callers are kept away from login/signup, and admin pages require
//! the admin role.

pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod gate;
pub mod jwt;
pub mod middleware;
pub mod routes;
pub mod server;
