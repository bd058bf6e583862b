//! # Router Module
//!
//! Explicit routes registered in code, matched before convention routing.
//!
//! ## Overview
//!
//! A [`RouteTable`] collects routes with their methods, path pattern,
//! callback and route-level middleware, plus the per-segment policies the
//! dispatcher consults when nothing matches:
//!
//! - fallback handlers, per segment
//! - default-route disabling, per segment or app, per controller class, and
//!   per controller action
//!
//! Matching goes through the [`RouteMatcher`] trait, which returns a
//! [`RouteVerdict`]: a found route with its captured parameters, a method
//! mismatch with the allowed methods, or no match.
//!
//! ## Path patterns
//!
//! Patterns are split on `/`. A `{name}` segment captures any one segment and
//! `{name:regex}` captures a segment the regex accepts in full. Static
//! segments beat parameter segments at the same depth.
//!
//! ## Example
//!
//! ```rust,ignore
//! use t2engine::router::{RouteMatcher, RouteTable, RouteVerdict};
//! use t2engine::handler::Handler;
//!
//! let mut routes = RouteTable::new();
//! routes
//!     .get("/users/{id:\\d+}", ("app\\controller\\User", "show"))
//!     .name("user.show");
//! assert_eq!(routes.url("user.show", &[("id", "7")]).as_deref(), Some("/users/7"));
//! ```
//!
//! ## Performance
//!
//! The radix tree is compiled lazily on the first match after a change and
//! matching is linear in the number of path segments.

mod core;
mod radix;

pub use core::{Callback, Route, RouteMatcher, RouteTable, RouteVerdict};
