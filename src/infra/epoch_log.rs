// ============================================================
// Layer 6 — Epoch Log
// ============================================================
// One tab-separated file per epoch, `epoch_log_<epoch>.log`:
//
//   Text  sent_index  token_index  predicted  noisy  clean  noisy_flag
//   last_prediction  last_confidence_sum  last_sq_difference_sum
//   last_correctness_sum  last_iteration  total_epochs
//   <one column per metric, in strategy order>
//
// One row per token, a blank line after every sentence. The
// history columns hold the values from *before* this epoch's
// update; the metric columns hold this epoch's values. Numbers
// are rounded to 4 decimals.
//
// The remediation and census commands read these files back.
// A missing log is fatal: the baseline run has to be repeated.

use anyhow::{bail, Context, Result};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::history::TokenMetricHistory;
use crate::domain::metrics::{Metric, TokenMetrics};

pub const TOKEN_COLUMNS: [&str; 7] =
    ["Text", "sent_index", "token_index", "predicted", "noisy", "clean", "noisy_flag"];

pub const HISTORY_COLUMNS: [&str; 6] = [
    "last_prediction",
    "last_confidence_sum",
    "last_sq_difference_sum",
    "last_correctness_sum",
    "last_iteration",
    "total_epochs",
];

pub fn epoch_log_path(dir: &Path, epoch: u32) -> PathBuf {
    dir.join(format!("epoch_log_{epoch}.log"))
}

/// Rounded to 4 decimals, integers without a fraction.
fn fmt_value(v: f64) -> String {
    let r = (v * 10_000.0).round() / 10_000.0 + 0.0;
    format!("{r}")
}

fn fmt_flag(flag: bool) -> &'static str {
    if flag { "True" } else { "False" }
}

fn parse_field<T>(field: &str, what: &str, at: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    field
        .parse()
        .map_err(|e| anyhow::anyhow!("{at}: invalid {what} '{field}': {e}"))
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1"  => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

// ─── Writer ───────────────────────────────────────────────────────────────────
/// Everything logged for one token in one epoch.
#[derive(Debug)]
pub struct EpochLogRow<'a> {
    pub text:            &'a str,
    pub sent_index:      usize,
    pub token_index:     usize,
    pub predicted:       &'a str,
    pub noisy:           &'a str,
    pub clean:           &'a str,
    /// Tag predicted in the previous epoch, `None` before the first
    pub last_prediction: Option<&'a str>,
    /// History before this epoch's update
    pub history:         &'a TokenMetricHistory,
    pub metrics:         &'a TokenMetrics,
}

pub struct EpochLogWriter {
    path:    PathBuf,
    writer:  BufWriter<File>,
    metrics: Vec<Metric>,
    rows:    usize,
}

impl EpochLogWriter {
    /// Create (or truncate) the log for `epoch` and write its header.
    pub fn create(dir: &Path, epoch: u32, metrics: Vec<Metric>) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create directory '{}'", dir.display()))?;
        let path = epoch_log_path(dir, epoch);
        let file = File::create(&path)
            .with_context(|| format!("Cannot create epoch log '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);

        let header: Vec<&str> = TOKEN_COLUMNS
            .iter()
            .chain(HISTORY_COLUMNS.iter())
            .copied()
            .chain(metrics.iter().map(Metric::as_str))
            .collect();
        writeln!(writer, "{}", header.join("\t"))?;

        Ok(Self { path, writer, metrics, rows: 0 })
    }

    pub fn write_row(&mut self, row: &EpochLogRow) -> Result<()> {
        let h = row.history;
        let mut fields = vec![
            row.text.to_string(),
            row.sent_index.to_string(),
            row.token_index.to_string(),
            row.predicted.to_string(),
            row.noisy.to_string(),
            row.clean.to_string(),
            fmt_flag(row.noisy != row.clean).to_string(),
            row.last_prediction.unwrap_or("-").to_string(),
            fmt_value(h.last_confidence_sum),
            fmt_value(h.last_sq_difference_sum),
            fmt_value(h.last_correctness_sum),
            h.last_iteration.to_string(),
            h.total_epochs.to_string(),
        ];
        for &metric in &self.metrics {
            let value = row
                .metrics
                .get(metric)
                .with_context(|| format!("token has no value for metric '{metric}'"))?;
            fields.push(fmt_value(value));
        }
        writeln!(self.writer, "{}", fields.join("\t"))?;
        self.rows += 1;
        Ok(())
    }

    pub fn end_sentence(&mut self) -> Result<()> {
        writeln!(self.writer)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Cannot flush epoch log '{}'", self.path.display()))
    }

    /// Flush and return the path and number of rows written.
    pub fn finish(mut self) -> Result<(PathBuf, usize)> {
        self.flush()?;
        Ok((self.path, self.rows))
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct EpochLogRecord {
    pub text:        String,
    pub sent_index:  usize,
    pub token_index: usize,
    pub predicted:   String,
    pub noisy:       String,
    pub clean:       String,
    pub noisy_flag:  bool,
    /// Metric values in the order of `EpochLog::metrics`
    pub values:      Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct EpochLog {
    origin:  String,
    metrics: Vec<Metric>,
    records: Vec<EpochLogRecord>,
}

impl EpochLog {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Cannot read epoch log '{}'", path.display()))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// `origin` names the source in error messages.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let mut lines = content.lines().enumerate();
        let header: Vec<&str> = match lines.next() {
            Some((_, line)) => line.trim_end_matches('\r').split('\t').filter(|c| !c.is_empty()).collect(),
            None => bail!("epoch log '{origin}' is empty"),
        };

        let column = |name: &str| -> Result<usize> {
            header
                .iter()
                .position(|c| *c == name)
                .with_context(|| format!("epoch log '{origin}' has no '{name}' column"))
        };
        let text  = column("Text")?;
        let sent  = column("sent_index")?;
        let tok   = column("token_index")?;
        let pred  = column("predicted")?;
        let noisy = column("noisy")?;
        let clean = column("clean")?;
        let flag  = column("noisy_flag")?;

        let metric_columns: Vec<(usize, Metric)> = header
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.parse::<Metric>().ok().map(|m| (i, m)))
            .collect();

        let mut records = Vec::new();
        for (line_no, line) in lines {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < header.len() {
                bail!(
                    "{origin}:{}: expected {} columns, found {}",
                    line_no + 1,
                    header.len(),
                    fields.len()
                );
            }
            let at = format!("{origin}:{}", line_no + 1);

            let values = metric_columns
                .iter()
                .map(|&(i, m)| parse_field::<f64>(fields[i], m.as_str(), &at))
                .collect::<Result<Vec<_>>>()?;

            records.push(EpochLogRecord {
                text:        fields[text].to_string(),
                sent_index:  parse_field(fields[sent], "sent_index", &at)?,
                token_index: parse_field(fields[tok], "token_index", &at)?,
                predicted:   fields[pred].to_string(),
                noisy:       fields[noisy].to_string(),
                clean:       fields[clean].to_string(),
                noisy_flag:  parse_flag(fields[flag])
                    .with_context(|| format!("{at}: invalid noisy_flag '{}'", fields[flag]))?,
                values,
            });
        }

        Ok(Self {
            origin: origin.to_string(),
            metrics: metric_columns.into_iter().map(|(_, m)| m).collect(),
            records,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn records(&self) -> &[EpochLogRecord] {
        &self.records
    }

    /// Position of `metric` within `EpochLogRecord::values`.
    pub fn metric_index(&self, metric: Metric) -> Result<usize> {
        self.metrics
            .iter()
            .position(|&m| m == metric)
            .with_context(|| format!("epoch log '{}' has no '{metric}' column", self.origin))
    }
}

// ─── EpochLogSource ───────────────────────────────────────────────────────────
/// Where the remediation reads per-epoch logs from.
pub trait EpochLogSource {
    fn epoch_log(&self, epoch: u32) -> Result<EpochLog>;
}

/// Logs stored as `epoch_log_<epoch>.log` in one directory.
#[derive(Debug, Clone)]
pub struct EpochLogDir {
    dir: PathBuf,
}

impl EpochLogDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Epoch numbers of all logs present, ascending.
    pub fn available_epochs(&self) -> Result<Vec<u32>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?;
        let mut epochs = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let epoch = name
                .to_str()
                .and_then(|n| n.strip_prefix("epoch_log_"))
                .and_then(|n| n.strip_suffix(".log"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(epoch) = epoch {
                epochs.push(epoch);
            }
        }
        epochs.sort_unstable();
        Ok(epochs)
    }
}

impl EpochLogSource for EpochLogDir {
    fn epoch_log(&self, epoch: u32) -> Result<EpochLog> {
        let path = epoch_log_path(&self.dir, epoch);
        if !path.exists() {
            bail!(
                "epoch log '{}' is missing; rerun the baseline training to produce it",
                path.display()
            );
        }
        EpochLog::read(&path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> TokenMetrics {
        TokenMetrics {
            confidence: 0.123456,
            variability: 0.0,
            correctness: 1.0,
            msp: 0.9,
            bvsb: 0.8,
            cross_entropy: 0.1,
            entropy: 0.3,
            iter_norm: 1.0,
            pehist: 0.0,
            mild_m: 0,
            mild_f: 1,
            mild: -1,
            layer: None,
        }
    }

    #[test]
    fn test_value_format() {
        assert_eq!(fmt_value(0.123456), "0.1235");
        assert_eq!(fmt_value(2.0), "2");
        assert_eq!(fmt_value(-0.00001), "0");
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = EpochLogWriter::create(dir.path(), 1, Metric::BASE.to_vec()).unwrap();
        let history = TokenMetricHistory::new(3);
        let m = metrics();
        writer
            .write_row(&EpochLogRow {
                text: "Paris",
                sent_index: 0,
                token_index: 0,
                predicted: "S-LOC",
                noisy: "O",
                clean: "S-LOC",
                last_prediction: None,
                history: &history,
                metrics: &m,
            })
            .unwrap();
        writer.end_sentence().unwrap();
        let (path, rows) = writer.finish().unwrap();
        assert_eq!(rows, 1);

        let content = fs::read_to_string(&path).unwrap();
        let first = content.lines().nth(1).unwrap();
        assert!(first.starts_with("Paris\t0\t0\tS-LOC\tO\tS-LOC\tTrue\t-\t0\t"));
        assert!(content.ends_with("\n\n"));

        let log = EpochLogDir::new(dir.path()).epoch_log(1).unwrap();
        assert_eq!(log.metrics(), &Metric::BASE);
        let record = &log.records()[0];
        assert!(record.noisy_flag);
        assert_eq!(record.predicted, "S-LOC");
        let i = log.metric_index(Metric::Confidence).unwrap();
        assert_eq!(record.values[i], 0.1235);
        assert_eq!(record.values[log.metric_index(Metric::Mild).unwrap()], -1.0);
        assert!(log.metric_index(Metric::PredictionDepth).is_err());
    }

    #[test]
    fn test_missing_log_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = EpochLogDir::new(dir.path()).epoch_log(7).unwrap_err();
        assert!(err.to_string().contains("epoch_log_7.log"));
    }

    #[test]
    fn test_available_epochs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for e in [10, 2, 1] {
            fs::write(epoch_log_path(dir.path(), e), "Text\n").unwrap();
        }
        fs::write(dir.path().join("metrics.csv"), "").unwrap();
        let epochs = EpochLogDir::new(dir.path()).available_epochs().unwrap();
        assert_eq!(epochs, vec![1, 2, 10]);
    }

    #[test]
    fn test_short_row_is_error() {
        let content = "Text\tsent_index\ttoken_index\tpredicted\tnoisy\tclean\tnoisy_flag\tconfidence\nParis\t0\t0\n";
        let err = EpochLog::parse(content, "mem").unwrap_err();
        assert!(err.to_string().contains("mem:2"));
    }
}
