//! Backend implementations for different inference engines

pub mod mock;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use mock::MockBackend;
#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;
