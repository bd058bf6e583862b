//! # Dispatcher Module
//!
//! The dispatcher turns one inbound request into exactly one response. It
//! owns the resolution cache, the route table, the convention resolver and
//! the pipeline builder, and walks a fixed sequence of states per request:
//!
//! 1. **Cache hit** - a previous resolution for `method ⧺ path` is invoked
//! 2. **Unsafe path** - traversal or control bytes render the 400 fallback
//! 3. **Static or script file** - an existing file under the segment's public
//!    directory is executed (scripts) or served through a cached pipeline
//! 4. **Route match** - an explicit route is bound, built, cached and invoked
//! 5. **Convention match** - the URL names a controller class and action
//!    and no disable policy vetoes it
//! 6. **Fallback** - the segment's fallback handler, or a built-in one that
//!    yields 404 (405 after a method mismatch)
//!
//! ## Failure containment
//!
//! Handler and middleware failures are translated inside the pipeline, one
//! layer at a time. Anything that escapes resolution itself (a controller
//! that cannot be built, a middleware id the container does not know) is
//! caught by the outer boundary in [`Dispatcher::handle`]. No failure leaves
//! the dispatcher.
//!
//! ## Concurrency
//!
//! A dispatcher is shared by reference across `may` coroutines. Resolution
//! never yields: an entry is resolved and inserted in one synchronous step,
//! so concurrent requests only ever observe complete cache entries, and the
//! last writer for a key wins.
//!
//! ```rust,ignore
//! use t2engine::dispatcher::Dispatcher;
//! use t2engine::router::RouteTable;
//! use t2engine::handler::Handler;
//!
//! let mut routes = RouteTable::new();
//! routes.get("/hello/{name}", Handler::from_fn(|req| {
//!     Ok(format!("hello {}", req.route.as_ref().and_then(|r| r.param("name")).unwrap_or("")))
//! }));
//! let dispatcher = Dispatcher::builder().routes(routes).build();
//! ```

mod core;

pub use core::{Dispatcher, DispatcherBuilder, STATIC_APP};
