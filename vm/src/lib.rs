pub use chip8::Chip8;
pub use error::Chip8Error;

mod chip8;
pub mod constants;
mod error;
pub mod instruction;
pub mod opcode;
mod operations;
pub mod state;
pub mod timer;
