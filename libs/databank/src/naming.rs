//! Naming conventions for objects stored in a space database.
//!
//! A table with id `5c5bf8539ee9434aa721560c89f34ed6` lives in SQLite as
//! `tb_5c5bf8539ee9434aa721560c89f34ed6`; documents use the `doc_` prefix.

use rand::Rng;
use uuid::Uuid;

use crate::error::{Error, Result};

const TABLE_PREFIX: &str = "tb_";
const DOC_PREFIX: &str = "doc_";
const COLUMN_PREFIX: &str = "cl_";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn raw_table_name(table_id: &str) -> String {
    format!("{}{}", TABLE_PREFIX, table_id)
}

pub fn table_id_from_raw(raw_table_name: &str) -> &str {
    raw_table_name
        .strip_prefix(TABLE_PREFIX)
        .unwrap_or(raw_table_name)
}

pub fn raw_doc_name(doc_id: &str) -> String {
    format!("{}{}", DOC_PREFIX, doc_id)
}

/// Drop `-` and `_` from a uuid to get the short form used as an id
pub fn shorten_id(id: &str) -> String {
    id.chars().filter(|c| *c != '-' && *c != '_').collect()
}

/// Re-insert the dashes of a 32-char short id
pub fn expand_short_id(short_id: &str) -> Option<String> {
    if short_id.len() != 32 || !short_id.is_ascii() {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}-{}",
        &short_id[0..8],
        &short_id[8..12],
        &short_id[12..16],
        &short_id[16..20],
        &short_id[20..]
    ))
}

/// Fresh short uuid for a new table or document
pub fn generate_table_id() -> String {
    shorten_id(&Uuid::new_v4().to_string())
}

/// `cl_` followed by four random base-36 characters
pub fn generate_column_name() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", COLUMN_PREFIX, suffix)
}

/// Accept only names made of ASCII letters, digits, `_` and `-`
pub fn check_db_name(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name)
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// Quote a table or column name after checking it is a plain identifier
pub fn quote_ident(name: &str) -> Result<String> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(format!("\"{}\"", name))
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}
