pub mod crypto;
pub mod order;
pub mod user;

pub use crypto::{Crypto, NewCrypto};
pub use order::{NewOrder, Order, OrderDetail, OrderPatch, OrderReplace, OrderSummary};
pub use user::{normalize_email, NewUser, User};
