pub mod account_handlers;
pub mod activity_handlers;
pub mod bug_handlers;
pub mod comment_handlers;
pub mod extract;
pub mod health_handlers;
pub mod project_handlers;
pub mod ws_handlers;
