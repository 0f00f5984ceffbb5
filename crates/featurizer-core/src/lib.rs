//! Featurizer Core
//!
//! Pretrained, immutable featurization transforms and the binary archives
//! they are shipped in. A transform is fitted elsewhere, serialized once, and
//! later loaded by an operator kernel that drives it through the
//! execute/flush [`Transformer`] protocol.
//!
//! # Example
//!
//! ```rust
//! use featurizer_core::{ElementType, PcaTransformer, Transformer};
//! use ndarray::array;
//!
//! let fitted = PcaTransformer::new(array![[1.0f32, 0.0], [0.0, 2.0]], None).unwrap();
//! let bytes = fitted.to_bytes(ElementType::Float32).unwrap();
//!
//! let loaded = PcaTransformer::<f32>::from_bytes(&bytes).unwrap();
//! let input = array![[3.0f32, 4.0]];
//! let mut session = loaded.session();
//! let mut out = None;
//! session.execute(input.view(), &mut |m| { out = Some(m); Ok(()) }).unwrap();
//! session.flush(&mut |_| Ok(())).unwrap();
//! assert_eq!(out.unwrap(), array![[3.0f32, 8.0]]);
//! ```

pub mod archive;
pub mod element;
pub mod error;
pub mod pca;
pub mod transformer;

// Re-export main types at crate root
pub use archive::{Archive, ArchiveWriter};
pub use element::{Element, ElementType};
pub use error::{ArchiveError, FeaturizerError, Result};
pub use pca::{inspect, ArchiveInfo, PcaSession, PcaTransformer};
pub use transformer::{Callback, Transformer};
