//! Fixed-width binary coding used by the per-frame record and the up-direction reports.
//!
//! Every multi-byte value is big-endian. There are no varints: records travel in a
//! header extension with a hard size bound, so a predictable layout beats compactness.

mod decode;
mod encode;
mod version;

pub use decode::*;
pub use encode::*;
pub use version::*;
