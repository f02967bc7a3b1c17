//! Streaming file transfer over a single byte stream.
//!
//! One connection carries one transfer, in either direction:
//!
//! ```text
//! Send (client -> server):
//! +--------------+     +--------------+          +--------------+
//! | Walker /     | --> |  Send pump   | == TCP =>|  Receiver /  |
//! | Streamer     |     | (mpsc(1))    |          |  Assembler   |
//! +--------------+     +--------------+          +--------------+
//!
//! Request (client <- server): the same pipeline, run by the server after
//! it reads the client's request frames.
//! ```
//!
//! Frame layout lives in [`protocol`]; primitive encoders and readers in
//! [`codec`].

pub mod chunk;
pub mod codec;
pub mod protocol;
pub mod pump;
pub mod receiver;
pub mod session;
pub mod stats;
pub mod walker;

pub use chunk::{assemble_file, stream_file, stream_path, Assembled};
pub use protocol::{
    Direction, TransferMode, TransferRequest, DEFAULT_BUF_SIZE, MAX_CHUNK_SIZE, MAX_PATH_LEN,
};
pub use pump::{FrameSender, SendPump, PUMP_QUEUE_DEPTH};
pub use receiver::receive_directory;
pub use session::{execute, request_path, send_path, serve_connection, ServedTransfer};
pub use stats::TransferStats;
pub use walker::{send_directory, FileRecord, FileWalk, WALK_QUEUE_DEPTH};
