//! Protocol module - Defines the wire protocol for tagrpc communication
//!
//! Every message travels as a single JSON object (the envelope):
//! - `type-name`: name of the message variant
//! - `namespace`: namespace the variant belongs to
//! - the variant's own fields, flattened next to the two reserved keys
//!
//! A connection carries exactly one envelope in each direction.

mod codec;
mod envelope;
mod message;
mod registry;

pub use codec::*;
pub use envelope::*;
pub use message::*;
pub use registry::*;

/// Default port for tagrpc services
pub const DEFAULT_PORT: u16 = 8081;

/// Default cap on the size of a single encoded message
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 2000;

/// Smallest size cap a peer may be configured with
pub const MIN_MESSAGE_SIZE: usize = 256;

/// Reserved envelope key naming the message variant
pub const TYPE_NAME_KEY: &str = "type-name";

/// Reserved envelope key naming the variant's namespace
pub const NAMESPACE_KEY: &str = "namespace";

/// Namespace of the messages defined by this program
pub const LOCAL_NAMESPACE: &str = "local";

/// Namespace of the recipe store's row shape
pub const RECIPE_NAMESPACE: &str = "recipes";
