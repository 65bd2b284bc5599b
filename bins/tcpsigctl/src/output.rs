//! Text and JSON rendering of SA listings.

use std::io::{self, Write};

use serde::Serialize;
use tcpsig::SaEntry;

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json { pretty: bool },
}

/// JSON view of one SA.
#[derive(Debug, Serialize)]
pub struct EntryView {
    pub family: tcpsig::AddressFamily,
    pub src: String,
    pub dst: String,
    pub key_bits: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl From<&SaEntry> for EntryView {
    fn from(entry: &SaEntry) -> Self {
        Self {
            family: entry.family,
            src: entry.src.to_string(),
            dst: entry.dst.to_string(),
            key_bits: entry.key_bits,
            key: entry.key.as_deref().map(hex::encode),
        }
    }
}

/// Write one SA per line, or a JSON array.
pub fn print_entries<W: Write>(
    w: &mut W,
    entries: &[SaEntry],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            for entry in entries {
                write!(
                    w,
                    "{} src {} dst {} bits {}",
                    entry.family, entry.src, entry.dst, entry.key_bits
                )?;
                if let Some(key) = entry.key.as_deref() {
                    write!(w, " key {}", hex::encode(key))?;
                }
                writeln!(w)?;
            }
        }
        OutputFormat::Json { pretty } => {
            let views: Vec<EntryView> = entries.iter().map(EntryView::from).collect();
            write_json(w, &views, pretty)?;
        }
    }
    Ok(())
}

/// Write a JSON value followed by a newline.
pub fn write_json<W: Write, T: Serialize>(w: &mut W, value: &T, pretty: bool) -> io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *w, value)?;
    } else {
        serde_json::to_writer(&mut *w, value)?;
    }
    writeln!(w)
}
