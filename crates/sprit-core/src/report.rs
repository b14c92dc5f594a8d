//! Report assembly: per-site summary rows, the batch CSV table and the
//! human-readable test report.

use crate::curve::AggregateCurve;
use crate::sesame::{PassList, PeakReport, SesameTest};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Descriptive information about a site.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMetadata {
    /// Site name, used to identify the site in logs and reports.
    pub site: String,
    /// Acquisition date as written by the operator (e.g. `2023-06-14`).
    pub acquisition_date: String,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Elevation in metres.
    pub elevation: f64,
}

impl SiteMetadata {
    /// Metadata with only a site name.
    pub fn named(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            ..Self::default()
        }
    }
}

/// One row of the batch summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    /// Site information.
    pub metadata: SiteMetadata,
    /// Best peak frequency, if one was found.
    pub peak_frequency: Option<f64>,
    /// Outcome of the nine tests for the best peak.
    pub pass_list: PassList,
    /// Overall verdict for the best peak.
    pub peak_passes: bool,
    /// Depth to bedrock, when the site was processed with a depth model.
    pub depth: Option<f64>,
}

impl SummaryRow {
    /// Row for a graded site. Without a best peak every test is false.
    pub fn from_report(metadata: SiteMetadata, report: &PeakReport) -> Self {
        match report.best_peak() {
            Some(p) => Self {
                metadata,
                peak_frequency: Some(p.f0),
                pass_list: p.pass_list,
                peak_passes: p.peak_passes,
                depth: None,
            },
            None => Self::failed(metadata),
        }
    }

    /// Row for a site that could not be processed.
    pub fn failed(metadata: SiteMetadata) -> Self {
        Self {
            metadata,
            peak_frequency: None,
            pass_list: PassList::default(),
            peak_passes: false,
            depth: None,
        }
    }
}

/// Header of the optional depth column, written after "Peak Frequency".
pub const DEPTH_COLUMN: &str = "Bedrock Depth";

/// Column headers of the summary table.
pub fn summary_header() -> Vec<&'static str> {
    let mut header = vec![
        "Site Name",
        "Acquisition Date",
        "Longitude",
        "Latitude",
        "Elevation",
        "Peak Frequency",
    ];
    header.extend(SesameTest::ALL.iter().map(|t| t.name()));
    header.push("Peak Passes");
    header
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn bool_field(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

fn invalid_data(line: usize, msg: impl Into<String>) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line {line}: {}", msg.into()),
    )
}

/// Write the summary table as CSV.
///
/// The depth column is present only when at least one row carries a depth.
pub fn write_summary_csv<W: Write>(mut out: W, rows: &[SummaryRow]) -> io::Result<()> {
    let with_depth = rows.iter().any(|r| r.depth.is_some());
    let mut header = summary_header();
    if with_depth {
        header.insert(6, DEPTH_COLUMN);
    }
    writeln!(out, "{}", header.join(","))?;
    for row in rows {
        let m = &row.metadata;
        write!(
            out,
            "{},{},{},{},{},",
            csv_field(&m.site),
            csv_field(&m.acquisition_date),
            m.longitude,
            m.latitude,
            m.elevation
        )?;
        if let Some(f) = row.peak_frequency {
            write!(out, "{f}")?;
        }
        if with_depth {
            write!(out, ",")?;
            if let Some(d) = row.depth {
                write!(out, "{d}")?;
            }
        }
        for (_, pass) in row.pass_list.iter() {
            write!(out, ",{}", bool_field(pass))?;
        }
        writeln!(out, ",{}", bool_field(row.peak_passes))?;
    }
    Ok(())
}

/// Write the summary table to a file.
pub fn export_summary_csv(path: impl AsRef<Path>, rows: &[SummaryRow]) -> io::Result<()> {
    let file = std::fs::File::create(path)?;
    write_summary_csv(io::BufWriter::new(file), rows)
}

/// Read a summary table written by [`write_summary_csv`].
///
/// Test columns are matched by header name, so column order is free. The
/// depth column is optional.
pub fn read_summary_csv<R: BufRead>(input: R) -> io::Result<Vec<SummaryRow>> {
    let mut lines = input.lines();
    let header = match lines.next() {
        Some(line) => split_csv_line(&line?),
        None => return Ok(Vec::new()),
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| invalid_data(1, format!("missing column '{name}'")))
    };
    let site_col = column("Site Name")?;
    let date_col = column("Acquisition Date")?;
    let lon_col = column("Longitude")?;
    let lat_col = column("Latitude")?;
    let elev_col = column("Elevation")?;
    let freq_col = column("Peak Frequency")?;
    let pass_col = column("Peak Passes")?;
    let depth_col = header.iter().position(|h| h.trim() == DEPTH_COLUMN);
    let test_cols = SesameTest::ALL
        .iter()
        .map(|t| column(t.name()))
        .collect::<io::Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for (n, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let lineno = n + 2;
        let fields = split_csv_line(&line);
        if fields.len() < header.len() {
            return Err(invalid_data(
                lineno,
                format!("expected {} fields, found {}", header.len(), fields.len()),
            ));
        }
        let number = |col: usize| -> io::Result<f64> {
            let text = fields[col].trim();
            text.parse()
                .map_err(|_| invalid_data(lineno, format!("'{text}' is not a number")))
        };
        let flag = |col: usize| -> io::Result<bool> {
            match fields[col].trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(invalid_data(lineno, format!("'{other}' is not a boolean"))),
            }
        };

        let mut pass = [false; 9];
        for (slot, &col) in pass.iter_mut().zip(&test_cols) {
            *slot = flag(col)?;
        }
        let optional = |col: usize| -> io::Result<Option<f64>> {
            if fields[col].trim().is_empty() {
                Ok(None)
            } else {
                number(col).map(Some)
            }
        };
        let peak_frequency = optional(freq_col)?;
        let depth = match depth_col {
            Some(col) => optional(col)?,
            None => None,
        };
        rows.push(SummaryRow {
            metadata: SiteMetadata {
                site: fields[site_col].clone(),
                acquisition_date: fields[date_col].clone(),
                longitude: number(lon_col)?,
                latitude: number(lat_col)?,
                elevation: number(elev_col)?,
            },
            peak_frequency,
            pass_list: PassList::from_array(pass),
            peak_passes: flag(pass_col)?,
            depth,
        });
    }
    Ok(rows)
}

/// Write the aggregate curve and its envelopes as CSV, one frequency per line.
pub fn write_curve_csv<W: Write>(mut out: W, curve: &AggregateCurve) -> io::Result<()> {
    writeln!(
        out,
        "freq_hz,hvsr,std_dev,log_std,hvsr_minus,hvsr_plus,hvsr_log_minus,hvsr_log_plus"
    )?;
    for i in 0..curve.freqs.len() {
        writeln!(
            out,
            "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            curve.freqs[i],
            curve.hvsr[i],
            curve.std_dev[i],
            curve.log_std[i],
            curve.hvsr_minus[i],
            curve.hvsr_plus[i],
            curve.hvsr_log_minus[i],
            curve.hvsr_log_plus[i]
        )?;
    }
    Ok(())
}

/// Human-readable pass/fail summary for one site.
pub fn text_report(
    metadata: &SiteMetadata,
    curve: &AggregateCurve,
    peaks: &PeakReport,
    total_windows: usize,
) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Site: {}", metadata.site);
    if !metadata.acquisition_date.is_empty() {
        let _ = writeln!(s, "Acquired: {}", metadata.acquisition_date);
    }
    let _ = writeln!(
        s,
        "Windows used: {} of {} ({} s each)",
        curve.num_windows_used, total_windows, curve.window_length
    );
    let _ = writeln!(s, "Candidate peaks: {}", peaks.peaks.len());

    let Some(best) = peaks.best_peak() else {
        let _ = writeln!(s, "No best peak identified");
        return s;
    };

    let _ = writeln!(s, "Best peak: f0 = {:.3} Hz, A0 = {:.3}", best.f0, best.a0);
    let _ = writeln!(s);
    let _ = writeln!(s, "Curve reliability ({}/3)", best.pass_list.curve_passed());
    for test in SesameTest::ALL.iter().filter(|t| t.is_curve_test()) {
        let _ = writeln!(s, "  {:<28} {}", test.name(), best.report_for(*test).trim());
    }
    let _ = writeln!(s, "Peak clarity ({}/6)", best.pass_list.peak_passed());
    for test in SesameTest::ALL.iter().filter(|t| !t.is_curve_test()) {
        let _ = writeln!(s, "  {:<28} {}", test.name(), best.report_for(*test).trim());
    }
    let _ = writeln!(s);
    let verdict = if best.peak_passes { "PASSES ✔" } else { "FAILS ✘" };
    let _ = writeln!(s, "Score {}/9: peak {verdict}", best.score);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(site: &str, f: Option<f64>, pass: [bool; 9]) -> SummaryRow {
        let pass_list = PassList::from_array(pass);
        SummaryRow {
            metadata: SiteMetadata {
                site: site.into(),
                acquisition_date: "2023-06-14".into(),
                longitude: -88.25,
                latitude: 40.1,
                elevation: 220.5,
            },
            peak_frequency: f,
            pass_list,
            peak_passes: pass_list.peak_passes(),
            depth: None,
        }
    }

    #[test]
    fn header_lists_every_test() {
        let h = summary_header();
        assert_eq!(h.len(), 16);
        assert_eq!(h[0], "Site Name");
        assert_eq!(h[6], "Window Length Freq.");
        assert_eq!(h[15], "Peak Passes");
    }

    #[test]
    fn csv_reproduces_peak_passes() {
        let mut mixed = [true; 9];
        mixed[7] = false;
        mixed[8] = false;
        let rows = vec![
            row("Site A", Some(2.5), [true; 9]),
            row("Site, \"B\"", Some(0.81), mixed),
            row("Site C", None, [false; 9]),
        ];
        let mut buf = Vec::new();
        write_summary_csv(&mut buf, &rows).unwrap();
        let parsed = read_summary_csv(buf.as_slice()).unwrap();
        assert_eq!(parsed, rows);
        for r in &parsed {
            assert_eq!(r.pass_list.peak_passes(), r.peak_passes);
        }
    }

    #[test]
    fn depth_column_only_when_some_row_has_depth() {
        let plain = vec![row("A", Some(1.0), [true; 9])];
        let mut buf = Vec::new();
        write_summary_csv(&mut buf, &plain).unwrap();
        assert!(!String::from_utf8(buf).unwrap().contains(DEPTH_COLUMN));

        let mut deep = row("A", Some(2.0), [true; 9]);
        deep.depth = Some(47.5);
        let rows = vec![deep, row("B", None, [false; 9])];
        let mut buf = Vec::new();
        write_summary_csv(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.contains("Peak Frequency,Bedrock Depth,"), "{header}");
        assert_eq!(read_summary_csv(text.as_bytes()).unwrap(), rows);
    }

    #[test]
    fn missing_column_is_reported() {
        let err = read_summary_csv("Site Name,Latitude\nx,1\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn bad_boolean_is_reported() {
        let rows = vec![row("A", Some(1.0), [true; 9])];
        let mut buf = Vec::new();
        write_summary_csv(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap().replace(",True\n", ",maybe\n");
        assert!(read_summary_csv(text.as_bytes()).is_err());
    }

    #[test]
    fn export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let rows = vec![row("A", Some(1.0), [true; 9])];
        export_summary_csv(&path, &rows).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        assert_eq!(read_summary_csv(io::BufReader::new(file)).unwrap(), rows);
    }

    #[test]
    fn quoted_fields_split() {
        assert_eq!(
            split_csv_line("a,\"b,c\",\"d\"\"e\""),
            vec!["a", "b,c", "d\"e"]
        );
    }
}
