pub mod content_import;
pub mod db_setup;
