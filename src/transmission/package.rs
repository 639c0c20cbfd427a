use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::TransmissionError;

/// Zip a single XML document. Entry timestamps are fixed, so the same
/// input always gives the same archive bytes.
pub fn build_package(entry_name: &str, xml: &[u8]) -> Result<Vec<u8>, TransmissionError> {
    let map = |e: zip::result::ZipError| TransmissionError::Packaging(e.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    zip.start_file(entry_name, options).map_err(map)?;
    zip.write_all(xml)
        .map_err(|e| TransmissionError::Packaging(e.to_string()))?;
    let cursor = zip.finish().map_err(map)?;
    Ok(cursor.into_inner())
}

/// Read the first `.xml` entry of an archive.
///
/// Returns `Ok(None)` when the archive holds no XML entry.
pub fn read_xml_entry(archive: &[u8]) -> Result<Option<(String, String)>, zip::result::ZipError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        if !file.is_file() || !file.name().to_ascii_lowercase().ends_with(".xml") {
            continue;
        }
        let name = file.name().to_string();
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        return Ok(Some((name, content)));
    }
    Ok(None)
}
