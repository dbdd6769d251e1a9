//! # Seckill Redis
//!
//! Redis implementations of the fast-path seams: the atomic inventory
//! store and the order ID worker.
//!
//! # Why Lua scripts?
//!
//! Admission must check stock, check the purchase record, and mutate both
//! in one indivisible step — three commands issued from the client would
//! race under concurrent buyers. Redis executes a Lua script atomically on
//! the server, which makes the script the serialization point for all
//! admission traffic on an item. The compensating release is a second
//! script for the same reason: removing the purchase record and crediting
//! stock must not interleave with admissions.
//!
//! # Key layout
//!
//! ```text
//! seckill:stock:{item}    remaining-stock counter (integer)
//! seckill:orders:{item}   set of admitted user IDs
//! icr:{category}:{date}   daily ID sequence
//! ```

mod id_worker;
mod store;

pub use id_worker::RedisIdWorker;
pub use store::RedisInventoryStore;
