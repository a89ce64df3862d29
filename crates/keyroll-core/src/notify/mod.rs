//! Templated notifications
//!
//! Templates are HTML files named `{template_id}.html` in the configured
//! templates directory.

mod dispatcher;
mod message;
mod template;

pub use dispatcher::{NotificationDispatcher, NotificationJob, NotificationKind, Notifier};
pub use message::{build_message, build_raw_message};
pub use template::{Bindings, escape_html, render_template};
