use parking_lot::Mutex;
use pstor::RangeResult;
use std::{io::Write, sync::Arc};

/// How range results are rendered.
#[derive(Debug, Clone, Copy, Eq, PartialEq, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum OutputFormat {
    /// One `index : key : value` line per entry.
    Plain,
    /// A table with the entries and their revisions.
    Table,
    /// One json object per entry.
    Json,
}

/// Data points that can be organized into a table.
pub(crate) trait TabledData {
    /// Title or first row (usually the name/identifier of each column).
    fn titles(&self) -> prettytable::Row;
    /// The remaining rows.
    fn rows(&self) -> Vec<prettytable::Row>;
}

impl TabledData for RangeResult {
    fn titles(&self) -> prettytable::Row {
        prettytable::Row::new(
            ["#", "Key", "Value", "Created", "Modified", "Version"]
                .into_iter()
                .map(prettytable::Cell::new)
                .collect(),
        )
    }

    fn rows(&self) -> Vec<prettytable::Row> {
        self.kvs
            .iter()
            .enumerate()
            .map(|(index, kv)| {
                prettytable::Row::new(vec![
                    prettytable::Cell::new(&index.to_string()),
                    prettytable::Cell::new(&kv.key_str()),
                    prettytable::Cell::new(&kv.value_str()),
                    prettytable::Cell::new(&kv.create_revision.to_string()),
                    prettytable::Cell::new(&kv.mod_revision.to_string()),
                    prettytable::Cell::new(&kv.version.to_string()),
                ])
            })
            .collect()
    }
}

/// Prints results and notifications to a shared output.
/// Clones share the output, so lines printed from different workers never interleave.
#[derive(Clone)]
pub(crate) struct Printer {
    format: OutputFormat,
    output: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Printer {
    /// New `Self` printing to stdout.
    pub(crate) fn stdout(format: OutputFormat) -> Self {
        Self::new(format, Box::new(std::io::stdout()))
    }
    /// New `Self` printing to the given output.
    pub(crate) fn new(format: OutputFormat, output: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            output: Arc::new(Mutex::new(output)),
        }
    }

    /// Print a single line.
    pub(crate) fn line(&self, line: impl AsRef<str>) {
        let mut output = self.output.lock();
        if let Err(error) = writeln!(output, "{}", line.as_ref()).and_then(|_| output.flush()) {
            tracing::warn!(%error, "Failed to write output");
        }
    }

    /// Print every entry of the range result.
    pub(crate) fn dump(&self, result: &RangeResult) {
        let text = match self.format {
            OutputFormat::Plain => result
                .kvs
                .iter()
                .enumerate()
                .map(|(index, kv)| format!("{index} : {} : {}\n", kv.key_str(), kv.value_str()))
                .collect::<String>(),
            OutputFormat::Table => {
                let rows = result.rows();
                if rows.is_empty() {
                    // no point printing empty tables
                    return;
                }
                let mut table = prettytable::Table::init(rows);
                table.set_format(*prettytable::format::consts::FORMAT_BOX_CHARS);
                table.set_titles(result.titles());
                table.to_string()
            }
            OutputFormat::Json => result
                .kvs
                .iter()
                .enumerate()
                .map(|(index, kv)| {
                    let object = serde_json::json!({
                        "index": index,
                        "key": kv.key_str(),
                        "value": kv.value_str(),
                        "create_revision": kv.create_revision,
                        "mod_revision": kv.mod_revision,
                        "version": kv.version,
                    });
                    format!("{object}\n")
                })
                .collect::<String>(),
        };

        let mut output = self.output.lock();
        if let Err(error) = output.write_all(text.as_bytes()).and_then(|_| output.flush()) {
            tracing::warn!(%error, "Failed to write output");
        }
    }
}
