pub mod chunk_file;
pub mod source_document;
