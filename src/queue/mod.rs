//! Durable Queue Module
//!
//! Named message queues backed by one file per message on disk and a bounded
//! in-memory buffer for delivery.
//!
//! ## Durability Model
//! - **Persist first**: a message is written to `<base>/<queue>/<id>.json` before it
//!   becomes visible in the buffer.
//! - **Delete last**: the file is removed only after a consumer handled the message.
//! - **Reload**: files on disk that are not in the buffer can be offered again at any time,
//!   so a crash or a buffer timeout between the two steps only delays delivery.
//!
//! ## Submodules
//! - **`types`**: `Message`, `MessageId` and the id generator.
//! - **`store`**: file-per-message persistence.
//! - **`queue`**: the bounded buffer plus its store.
//! - **`manager`**: name to queue registry for one broker.

pub mod manager;
pub mod queue;
pub mod store;
pub mod types;
