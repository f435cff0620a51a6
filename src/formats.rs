use std::rc::Rc;

use rblock::ReadDirection;
use rcore::{
    BlockId, ByteOrder, FieldFunction, FieldType, FormatSpecification, Interpreted, MagicKey,
    SpecificationBuilder, SpecificationError,
};

/// A format known to the cli along with the direction it is usually read in.
pub struct Format {
    pub name: &'static str,
    pub about: &'static str,
    pub direction: ReadDirection,
    build: fn() -> Result<FormatSpecification, SpecificationError>,
}

impl Format {
    pub fn specification(&self) -> Result<Rc<FormatSpecification>, SpecificationError> {
        (self.build)().map(Rc::new)
    }
}

pub const BUILTIN: &[Format] = &[
    Format {
        name: "ltvc",
        about: "length, type, value, checksum chunk archive",
        direction: ReadDirection::Forward,
        build: ltvc,
    },
    Format {
        name: "id3v1",
        about: "128 byte tag at the end of mp3 files",
        direction: ReadDirection::Backward,
        build: id3v1,
    },
];

pub fn find(name: &str) -> Option<&'static Format> {
    BUILTIN.iter().find(|f| f.name == name)
}

// | len: u32 LE | type: 4 bytes | data: len bytes | checksum: u32 LE |
//
// An archive opens with an AHDR chunk holding the version, every chunk after
// it is read as a generic chunk named by its type.
fn ltvc() -> Result<FormatSpecification, SpecificationError> {
    let chunk_payload = BlockId::new("ltvc", "ltvc.payload.chunk.payload");
    let chunk = BlockId::new("ltvc", "ltvc.payload.chunk");

    let mut b = SpecificationBuilder::new("ltvc");
    b.default_byte_order(ByteOrder::LittleEndian);
    b.default_encoding(encoding_rs::WINDOWS_1252);

    b.container("ltvc").header_key(MagicKey::new(b"AHDR", 4));
    b.header("ltvc.header");
    b.field("ltvc.header.len", FieldType::UnsignedNumeric).fixed(4);
    b.field("ltvc.header.type", FieldType::String).fixed(4);
    b.field("ltvc.header.version", FieldType::UnsignedNumeric).fixed(1);
    b.field("ltvc.header.checksum", FieldType::Binary).fixed(4);
    b.container_payload("ltvc.payload");

    b.container("ltvc.payload.chunk").generic();
    b.header("ltvc.payload.chunk.header");
    b.field("ltvc.payload.chunk.header.len", FieldType::UnsignedNumeric)
        .fixed(4)
        .add_function(FieldFunction::SizeOf(vec![chunk_payload]));
    b.field("ltvc.payload.chunk.header.type", FieldType::String)
        .fixed(4)
        .add_function(FieldFunction::IdOf(vec![chunk]));
    b.field_payload("ltvc.payload.chunk.payload");
    b.field("ltvc.payload.chunk.payload.data", FieldType::Binary);
    b.footer("ltvc.payload.chunk.footer");
    b.field("ltvc.payload.chunk.footer.checksum", FieldType::Binary).fixed(4);
    b.default_nested_container("ltvc.payload.chunk");

    b.build()
}

const GENRES: &[&str] = &[
    "Blues",
    "Classic Rock",
    "Country",
    "Dance",
    "Disco",
    "Funk",
    "Grunge",
    "Hip-Hop",
    "Jazz",
    "Metal",
    "New Age",
    "Oldies",
    "Other",
    "Pop",
    "R&B",
    "Rap",
    "Reggae",
    "Rock",
    "Techno",
    "Industrial",
];

fn id3v1() -> Result<FormatSpecification, SpecificationError> {
    let mut b = SpecificationBuilder::new("id3v1");
    b.default_encoding(encoding_rs::WINDOWS_1252);

    b.container("id3v1").header_key(MagicKey::new(b"TAG", 0));
    b.header("id3v1.header");
    b.field("id3v1.header.id", FieldType::String).fixed(3);
    b.field_payload("id3v1.payload").fixed(125);
    for (name, size) in [("title", 30), ("artist", 30), ("album", 30), ("year", 4), ("comment", 30)] {
        b.field(&format!("id3v1.payload.{}", name), FieldType::String)
            .fixed(size)
            .terminator('\0');
    }

    let genre = b.field("id3v1.payload.genre", FieldType::Enumerated);
    genre.fixed(1).default_value(Interpreted::Enumerated("Unknown".into()));
    for (i, name) in GENRES.iter().enumerate() {
        genre.enumerated(name, &[i as u8]);
    }

    b.build()
}
