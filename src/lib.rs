mod batch;
mod codec;
mod error;
mod midi_importer;
mod midi_writer;
mod model;
mod util;

pub use batch::*;
pub use codec::*;
pub use error::*;
pub use midi_importer::*;
pub use midi_writer::*;
pub use model::config::*;
pub use model::pitch::*;
pub use model::quantize::*;
pub use model::song::*;
pub use model::token::*;
pub use model::vocab::*;
pub use util::*;
