//! actix-web adapter.
//!
//! Register the manager as app data and mount the routes:
//!
//! ```rust,ignore
//! use actix_web::{App, web};
//! use latchkey::api::actix::session_routes;
//!
//! let manager = web::Data::new(manager);
//!
//! App::new()
//!     .app_data(manager.clone())
//!     .configure(session_routes::<SessionRepo, UserRepo>)
//! ```

mod context;
mod extractor;
mod handlers;
mod routes;

pub use context::{ActixRequestContext, to_actix_cookie};
pub use extractor::{SessionRejection, SessionUser};
pub use handlers::{session_logout, session_me, start_session};
pub use routes::session_routes;
