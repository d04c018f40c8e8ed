pub mod embedding_record;
pub mod note_text;
