//! Reading raw quality exports and writing normalized tables.
//!
//! Exports come from several plants and tools. They are comma or semicolon
//! separated, sometimes Windows-1252 encoded, and often carry a UTF-8 BOM.
//! Everything is loaded as text into a [`RawTable`]; typing happens later in
//! cost derivation.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::{debug, warn};

use crate::data::RawTable;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
const UTF8_BOM: char = '\u{feff}';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    label
        .map(|value| {
            Encoding::for_label(value.trim().as_bytes())
                .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
        })
        .transpose()
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>, fallback: u8) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    match path.and_then(|p| p.extension()).and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        Some(ext) if ext.eq_ignore_ascii_case("csv") => DEFAULT_CSV_DELIMITER,
        _ => fallback,
    }
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    Ok(if is_dash(path) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    })
}

/// Loads a delimited file into memory as text.
///
/// Without an explicit encoding the file is read as UTF-8 and, when that
/// fails anywhere in the file, decoded again as Windows-1252 (a superset of
/// Latin-1). Short rows are kept and read as blank cells.
pub fn load_table(
    path: &Path,
    delimiter: u8,
    encoding: Option<&'static Encoding>,
) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(open_input(path)?);

    let header_record = reader
        .byte_headers()
        .with_context(|| format!("Reading headers from {path:?}"))?
        .clone();
    let mut records = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        records.push(record);
    }

    let decode_all = |encoding: &'static Encoding| -> Result<RawTable> {
        let mut headers = decode_record(&header_record, encoding)?;
        if let Some(first) = headers.first_mut()
            && first.starts_with(UTF8_BOM)
        {
            *first = first.trim_start_matches(UTF8_BOM).to_string();
        }
        let rows = records
            .iter()
            .map(|record| decode_record(record, encoding))
            .collect::<Result<Vec<_>>>()?;
        Ok(RawTable::new(headers, rows))
    };

    let table = match encoding {
        Some(encoding) => decode_all(encoding)
            .with_context(|| format!("Decoding {path:?} as {}", encoding.name()))?,
        None => match decode_all(UTF_8) {
            Ok(table) => table,
            Err(err) => {
                warn!(
                    "{path:?} is not valid UTF-8 ({err}); falling back to {}",
                    WINDOWS_1252.name()
                );
                decode_all(WINDOWS_1252)?
            }
        },
    };
    debug!(
        "Loaded {} row(s) x {} column(s) from {path:?}",
        table.len(),
        table.headers.len()
    );
    Ok(table)
}

pub fn open_csv_writer(
    path: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout()),
    };

    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Re-encodes UTF-8 output for legacy spreadsheet tools.
struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    buffer: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }

    /// Writes out the longest valid UTF-8 prefix; a trailing partial
    /// character waits for the next write unless `force` is set.
    fn flush_buffer(&mut self, force: bool) -> io::Result<()> {
        let valid_up_to = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            Err(err) if err.error_len().is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence in output stream",
                ));
            }
            Err(err) => err.valid_up_to(),
        };
        if valid_up_to > 0 {
            let pending: Vec<u8> = self.buffer.drain(..valid_up_to).collect();
            let text = String::from_utf8(pending)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.encode_and_write(&text)?;
        }
        if force && !self.buffer.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Incomplete UTF-8 sequence at end of output stream",
            ));
        }
        Ok(())
    }

    fn encode_and_write(&mut self, text: &str) -> io::Result<()> {
        let (encoded, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.flush_buffer(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer(true)?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn latin1_file_falls_back_from_utf8() {
        let mut file = NamedTempFile::new().expect("temp file");
        // "Libellé;Chaine" / "Contrôle;CH1" in Windows-1252
        file.write_all(b"Libell\xe9;Chaine\nContr\xf4le;CH1\n")
            .expect("write");
        let table = load_table(file.path(), b';', None).expect("load");
        assert_eq!(table.headers, vec!["Libellé", "Chaine"]);
        assert_eq!(table.cell(0, 0), "Contrôle");
    }

    #[test]
    fn latin1_cells_resembling_a_bom_stay_latin1() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"Libelle;Chaine\n\xff\xfete;CH\xe9\n")
            .expect("write");
        let table = load_table(file.path(), b';', None).expect("load");
        assert_eq!(table.cell(0, 0), "\u{ff}\u{fe}te");
        assert_eq!(table.cell(0, 1), "CHé");
    }

    #[test]
    fn bom_is_stripped_and_short_rows_kept() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all("\u{feff}DATE,Quantite,Note\n2023-01-01,5\n".as_bytes())
            .expect("write");
        let table = load_table(file.path(), b',', None).expect("load");
        assert_eq!(table.headers[0], "DATE");
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, 1), "5");
        assert_eq!(table.cell(0, 2), "");
    }

    #[test]
    fn explicit_encoding_does_not_fall_back() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"Libell\xe9\nx\n").expect("write");
        let err = load_table(file.path(), b',', Some(UTF_8)).unwrap_err();
        assert!(format!("{err:#}").contains("UTF-8"));
    }

    #[test]
    fn encoding_labels_resolve() {
        assert_eq!(resolve_encoding(None).unwrap(), None);
        assert_eq!(
            resolve_encoding(Some("latin1")).unwrap(),
            Some(WINDOWS_1252)
        );
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn delimiters_follow_extension_unless_overridden() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), Some(b';')), b';');
        assert_eq!(
            resolve_output_delimiter(Some(Path::new("out.tsv")), None, b','),
            b'\t'
        );
        assert_eq!(resolve_output_delimiter(None, None, b';'), b';');
    }
}
