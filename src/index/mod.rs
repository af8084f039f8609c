pub mod field;
pub mod index;
pub mod holder;

pub use field::Field;
pub use holder::Holder;
pub use index::{Index, IndexInfo, IndexOptions, IndexOptionsRequest};
