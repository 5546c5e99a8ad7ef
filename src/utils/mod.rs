pub mod db_utils;
pub mod row_decode;
pub mod text_table;
