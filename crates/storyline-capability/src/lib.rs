pub mod adaptor;
pub mod detector;
pub mod error;
pub mod types;

pub use adaptor::adapt_response;
pub use detector::CapabilityDetector;
pub use error::{CapabilityError, Result};
pub use types::{AdaptedResponse, BaseResponse, DeviceCapabilities, PlatformContext};
