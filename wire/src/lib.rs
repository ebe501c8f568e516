mod editor;
mod error;
mod protocol_error;
mod reader;
mod schema;
mod token;
mod token_gen;
mod writer;

pub use editor::{CopyFrom, EditorCommand};
pub use error::{Error, Result, MAX_TOKEN_LEN};
pub use protocol_error::{error as error_code, ProtocolError};
pub use reader::Reader;
pub use schema::{read_record, write_values, Field, FieldKind, Record, Value};
pub use token::Item;
pub use token_gen::{Token, TokenGenerator};
pub use writer::Writer;
