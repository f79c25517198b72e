pub mod health;
pub mod turn;
pub mod webhooks;
