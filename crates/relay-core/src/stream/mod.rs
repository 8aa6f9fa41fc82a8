//! Client-facing streaming pipeline

pub mod token;
pub mod transcoder;

use crate::error::RelayResult;
use futures::Stream;
use std::pin::Pin;

pub use token::StreamToken;
pub use transcoder::StreamTranscoder;

/// Ordered stream of paced, client-visible tokens
pub type TokenStream = Pin<Box<dyn Stream<Item = RelayResult<StreamToken>> + Send>>;
