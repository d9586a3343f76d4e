pub mod assemble;
pub mod batch;
pub mod budget;
pub mod extract;
pub mod generate;
pub mod keys;
pub mod prompts;
pub mod validate;

pub use assemble::*;
pub use batch::*;
pub use budget::*;
pub use extract::*;
pub use generate::*;
pub use keys::*;
pub use prompts::*;
pub use validate::*;
