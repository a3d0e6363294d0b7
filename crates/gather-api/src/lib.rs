pub mod auth;
pub mod communities;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod search;
pub mod users;
