use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, select, unbounded, Sender};
use serde::{Deserialize, Serialize};

use crate::quotes::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    #[default]
    Csv,
    #[cfg_attr(feature = "clap", value(name = "jsonl"))]
    JsonLines,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum FileMode {
    /// Fails if the file already exists
    #[default]
    Create,
    Append,
    Truncate,
}

impl From<FileMode> for fs::OpenOptions {
    fn from(mode: FileMode) -> Self {
        let mut opts = fs::OpenOptions::new();
        match mode {
            FileMode::Create => opts.write(true).create_new(true),
            FileMode::Append => opts.append(true).create(true),
            FileMode::Truncate => opts.write(true).create(true).truncate(true),
        };
        opts
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordWriterConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub csv: CsvWriterConfig,
    #[serde(default)]
    pub file_mode: FileMode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvWriterConfig {
    #[serde(default = "default_csv_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub escape: Option<char>,
    #[serde(default = "default_csv_terminator")]
    pub terminator: CsvTerminator,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            escape: None,
            terminator: CsvTerminator::Any('\n'),
        }
    }
}

fn default_csv_delimiter() -> char {
    CsvWriterConfig::default().delimiter
}

fn default_csv_terminator() -> CsvTerminator {
    CsvWriterConfig::default().terminator
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CsvTerminator {
    CRLF,
    Any(char),
}

impl From<CsvTerminator> for csv::Terminator {
    fn from(source: CsvTerminator) -> Self {
        match source {
            CsvTerminator::CRLF => Self::CRLF,
            CsvTerminator::Any(c) => Self::Any(c as u8),
        }
    }
}

impl From<&CsvWriterConfig> for csv::WriterBuilder {
    fn from(c: &CsvWriterConfig) -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(c.delimiter as u8);
        builder.terminator(c.terminator.into());
        if let Some(escape) = c.escape {
            builder.double_quote(false);
            builder.escape(escape as u8);
        } else {
            builder.double_quote(true);
        }
        builder
    }
}

type Output = Box<dyn Write + Send>;

enum RecordOutput {
    Csv(csv::Writer<Output>),
    JsonLines(BufWriter<Output>),
}

impl RecordOutput {
    fn new(config: &RecordWriterConfig, out: Output) -> Self {
        match config.format {
            OutputFormat::Csv => Self::Csv(csv::WriterBuilder::from(&config.csv).from_writer(out)),
            OutputFormat::JsonLines => Self::JsonLines(BufWriter::new(out)),
        }
    }

    fn write(&mut self, record: &Record) -> anyhow::Result<()> {
        match self {
            Self::Csv(wtr) => wtr.serialize(record)?,
            Self::JsonLines(wtr) => {
                serde_json::to_writer(&mut *wtr, record)?;
                wtr.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Csv(wtr) => wtr.flush(),
            Self::JsonLines(wtr) => wtr.flush(),
        }
    }
}

/// Background thread writing records to a file or to stdout.
pub struct RecordWriter {
    tx_record: Sender<Record>,
    tx_stop: Sender<()>,
    handle: thread::JoinHandle<anyhow::Result<usize>>,
}

impl RecordWriter {
    pub fn spawn(config: &RecordWriterConfig, path: Option<&Path>) -> anyhow::Result<Self> {
        let out: Output = match path {
            Some(path) => {
                let opts: fs::OpenOptions = config.file_mode.into();
                let file = opts.open(path).map_err(|e| {
                    anyhow::anyhow!("Couldn't open output file {}: {e}", path.display())
                })?;
                Box::new(file)
            }
            None => Box::new(io::stdout()),
        };
        let mut out = RecordOutput::new(config, out);

        let (tx_record, rx_record) = unbounded::<Record>();
        let (tx_stop, rx_stop) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("record-writer".into())
            .spawn(move || {
                let mut written = 0;
                let mut failed = 0;
                let mut first_err = None;
                let mut write = |record: Record| match out.write(&record) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        log::error!("Couldn't write record: {e}");
                        failed += 1;
                        first_err.get_or_insert(e);
                    }
                };
                loop {
                    select! {
                        recv(rx_stop) -> _ => {
                            rx_record.try_iter().for_each(&mut write);
                            break;
                        },
                        recv(rx_record) -> msg => match msg {
                            Ok(record) => write(record),
                            Err(_) => break,
                        }
                    }
                }
                if let Err(e) = out.flush() {
                    return Err(anyhow::Error::new(e).context("Couldn't flush records"));
                }
                match first_err {
                    Some(e) => Err(e.context(format!("Couldn't write {failed} record(s)"))),
                    None => Ok(written),
                }
            })?;

        Ok(Self {
            tx_record,
            tx_stop,
            handle,
        })
    }

    pub fn sender(&self) -> Sender<Record> {
        self.tx_record.clone()
    }

    /// Writes pending records, flushes and returns how many records were written.
    ///
    /// Fails if any record could not be written or flushed.
    pub fn finish(self) -> anyhow::Result<usize> {
        self.tx_stop.send(()).ok();
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("Record writer thread panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn records() -> Vec<Record> {
        vec![
            Record {
                text: Some("Life is what happens...".into()),
                author: Some("John Lennon".into()),
            },
            Record {
                text: Some("Be yourself, everyone else is taken".into()),
                author: None,
            },
        ]
    }

    fn write_all(config: &RecordWriterConfig, path: &Path) -> usize {
        let writer = RecordWriter::spawn(config, Some(path)).unwrap();
        let tx = writer.sender();
        for r in records() {
            tx.send(r).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn csv_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.csv");

        assert_eq!(write_all(&RecordWriterConfig::default(), &path), 2);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "text,author\n\
             Life is what happens...,John Lennon\n\
             \"Be yourself, everyone else is taken\",\n"
        );
    }

    #[test]
    fn json_lines_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.jsonl");
        let config = RecordWriterConfig {
            format: OutputFormat::JsonLines,
            ..Default::default()
        };

        assert_eq!(write_all(&config, &path), 2);
        let lines = fs::read_to_string(&path).unwrap();
        let parsed = lines
            .lines()
            .map(|l| serde_json::from_str::<Record>(l).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(parsed, records());
        assert!(lines.ends_with("\"author\":null}\n"));
    }

    #[test]
    fn create_mode_refuses_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(RecordWriter::spawn(&RecordWriterConfig::default(), Some(file.path())).is_err());
    }

    #[test]
    fn append_mode_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.jsonl");
        let config = RecordWriterConfig {
            format: OutputFormat::JsonLines,
            file_mode: FileMode::Append,
            ..Default::default()
        };

        write_all(&config, &path);
        write_all(&config, &path);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_failures_are_reported() {
        let config = RecordWriterConfig {
            format: OutputFormat::JsonLines,
            file_mode: FileMode::Append,
            ..Default::default()
        };
        let writer = RecordWriter::spawn(&config, Some(Path::new("/dev/full"))).unwrap();
        let tx = writer.sender();
        for r in records() {
            tx.send(r).unwrap();
        }
        assert!(writer.finish().is_err());
    }

    #[test]
    fn csv_custom_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.tsv");
        let config = RecordWriterConfig {
            csv: CsvWriterConfig {
                delimiter: '\t',
                ..Default::default()
            },
            ..Default::default()
        };

        write_all(&config, &path);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next(), Some("text\tauthor"));
    }
}
