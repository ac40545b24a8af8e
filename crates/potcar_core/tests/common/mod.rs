#![allow(dead_code)]

use std::path::Path;

/// Builds a small but structurally realistic POTCAR record.
///
/// `variant` lands in the body only, so two calls that differ in `variant`
/// share every attribute but the hash.
pub fn potcar(prefix: &str, lexch: &str, symbol: &str, element: &str, variant: &str) -> Vec<u8> {
    format!(
        "  {prefix} {symbol} 06Sep2000\n\
         \x20 13.0000000000000000\n\
         \x20parameters from PSCTR are:\n\
         \x20  VRHFIN ={element}: s p\n\
         \x20  LEXCH  = {lexch}\n\
         \x20  TITEL  = {prefix} {symbol} 06Sep2000\n\
         \x20  POMASS =  114.760; ZVAL   =   13.000    mass and valenz\n\
         \x20  RCORE  =    2.600    outmost cutoff radius\n\
         \x20 Description {variant}\n\
         \x20 0.1234567E+01 0.2345678E+01\n\
         \x20End of Dataset\n"
    )
    .into_bytes()
}

pub fn pbe(symbol: &str, element: &str) -> Vec<u8> {
    potcar("PAW_PBE", "PE", symbol, element, "v1")
}

pub fn lda(symbol: &str, element: &str) -> Vec<u8> {
    potcar("PAW", "CA", symbol, element, "v1")
}

/// Same attributes as `pbe(symbol, element)`, different payload.
pub fn pbe_revision(symbol: &str, element: &str) -> Vec<u8> {
    potcar("PAW_PBE", "PE", symbol, element, "v2")
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    std::fs::write(dir.join(name), contents).unwrap();
}

pub fn count_rows(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}
