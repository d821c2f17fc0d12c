use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A message that can travel over a call in either encoding.
///
/// Implemented for every prost message that also derives serde.
pub trait RpcMessage: Message + Serialize + DeserializeOwned + Default + Send + 'static {}

impl<T> RpcMessage for T where T: Message + Serialize + DeserializeOwned + Default + Send + 'static {}
