//! amf3-sol: AMF3 codec and Flash shared object (SOL) files
//!
//! This library provides:
//! - A complete AMF3 value model, including cyclic arrays and objects
//! - Decoding and encoding of bare AMF3 values
//! - Reading and writing `.sol` files with their shared reference tables
//! - Pluggable readers for externalizable class payloads
//! - Dotted-path navigation for editing decoded data
//!
//! # Example: Edit a save file
//!
//! ```no_run
//! use amf3_sol::{sol, Value};
//!
//! fn main() -> amf3_sol::Result<()> {
//!     let mut file = sol::read_path("savegame.sol")?;
//!     if let Some(level) = file.get_i32("player.level") {
//!         println!("{} is at level {}", file.name, level);
//!         file.set("player.level", Value::Integer(level + 1))?;
//!     }
//!     sol::write_path(&file, "savegame.sol")?;
//!     Ok(())
//! }
//! ```

pub mod amf3;
pub mod config;
pub mod error;
pub mod path;
pub mod sol;

// Re-export main types for convenience
pub use amf3::{Amf3Decoder, Amf3Encoder, Arena, Document, Value};
pub use config::CodecConfig;
pub use error::{Error, Result};
pub use sol::SolFile;
