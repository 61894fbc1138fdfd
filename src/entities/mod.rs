pub mod earning;
pub mod entrepreneur;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod payment_transaction;
pub mod product;
pub mod product_variation;
pub mod wallet;
pub mod withdrawal_request;
