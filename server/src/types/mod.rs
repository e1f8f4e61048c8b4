pub mod client_message;
pub mod column_type;
pub mod string_value;

pub use column_type::{ColumnType, UnknownTypeError, ValidationError};
pub use string_value::StringValue;

pub trait ProtoDeserializable<T> {
    fn from_proto(proto_obj: T) -> Result<Self, String>
    where
        Self: Sized;
}

pub trait ProtoSerializable<T> {
    fn to_proto(self) -> T;
}
