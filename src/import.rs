use serde::Serialize;
use std::collections::HashMap;

/// One instructional module is a fixed 50-minute unit.
pub const MODULE_MINUTES: f64 = 50.0;

/// Round to 2 decimal places, used for module counts derived from minutes.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Zero-based column indices resolved from the header row.
///
/// `docente`, `minuti_settimana` and `tesoretto_annuale` are required;
/// `moduli_annui` and `saldo` fall back to derived values when their column
/// is absent, and `email` is entirely optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub docente: usize,
    pub minuti_settimana: usize,
    pub tesoretto_annuale: usize,
    pub moduli_annui: Option<usize>,
    pub saldo: Option<usize>,
    pub email: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedImportRecord {
    pub cognome: String,
    pub nome: String,
    pub email: Option<String>,
    pub minuti_settimana: f64,
    pub minuti_annui: f64,
    pub moduli_annui: f64,
    pub saldo: f64,
    /// 1-based data-row index (header excluded), for error reporting.
    pub row: usize,
    pub errors: Vec<String>,
}

impl ParsedImportRecord {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub error_rows: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub records: Vec<ParsedImportRecord>,
    pub stats: ImportStats,
    pub errors: Vec<String>,
}

impl ImportPreview {
    fn failed(errors: Vec<String>) -> Self {
        ImportPreview {
            records: Vec::new(),
            stats: ImportStats::default(),
            errors,
        }
    }
}

fn normalize_key(s: &str) -> String {
    s.trim().to_lowercase()
}

pub fn normalized_name_key(cognome: &str, nome: &str) -> String {
    format!("{}|{}", normalize_key(cognome), normalize_key(nome))
}

/// Header matching is case-insensitive and ignores spaces, underscores and
/// hyphens, so "Minuti Settimana", "minuti_settimana" and "minutiSettimana"
/// all name the same logical column.
fn normalize_header(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

fn find_column(header: &[String], name: &str) -> Option<usize> {
    let wanted = normalize_header(name);
    header.iter().position(|h| normalize_header(h) == wanted)
}

/// Resolve the column mapping from the header row. Missing required columns
/// are reported all at once as global errors.
pub fn resolve_column_mapping(header: &[String]) -> Result<ColumnMapping, Vec<String>> {
    let mut errors = Vec::new();
    let mut required = |name: &str| match find_column(header, name) {
        Some(i) => i,
        None => {
            errors.push(format!("missing required column: {}", name));
            0
        }
    };

    let docente = required("docente");
    let minuti_settimana = required("minutiSettimana");
    let tesoretto_annuale = required("tesorettoAnnuale");
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ColumnMapping {
        docente,
        minuti_settimana,
        tesoretto_annuale,
        moduli_annui: find_column(header, "moduliAnnui"),
        saldo: find_column(header, "saldo"),
        email: find_column(header, "email"),
    })
}

/// Pick the field delimiter by frequency in the header line. Italian exports
/// commonly use ';'.
fn detect_delimiter(header_line: &str) -> char {
    let mut best = ',';
    let mut best_count = 0usize;
    for cand in [';', ',', '\t'] {
        let count = header_line.matches(cand).count();
        if count > best_count {
            best = cand;
            best_count = count;
        }
    }
    best
}

/// Split one line into fields, honoring double quotes with "" escaping.
fn parse_record(line: &str, delim: char) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == delim && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Parse a number accepting the comma decimal separator. When a comma is
/// present, dots are read as thousands separators ("1.234,5" => 1234.5).
fn parse_decimal(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let normalized = if t.contains(',') {
        t.replace('.', "").replace(',', ".")
    } else {
        t.to_string()
    };
    normalized.parse::<f64>().ok()
}

/// Split a `docente` cell into (cognome, nome). With a comma the convention
/// is "Cognome, Nome"; without, the first whitespace token is the surname
/// and the remaining tokens the first name.
fn split_docente(s: &str) -> Option<(String, String)> {
    let t = s.trim();
    if let Some((last, first)) = t.split_once(',') {
        let last = last.trim();
        let first = first.trim();
        if last.is_empty() || first.is_empty() {
            return None;
        }
        return Some((last.to_string(), first.to_string()));
    }
    let mut tokens = t.split_whitespace();
    let last = tokens.next()?;
    let rest = tokens.collect::<Vec<_>>().join(" ");
    if rest.is_empty() {
        return None;
    }
    Some((last.to_string(), rest))
}

fn cell<'a>(fields: &'a [String], idx: usize) -> &'a str {
    fields.get(idx).map(|s| s.as_str()).unwrap_or("")
}

/// Parse one data row. Field failures never abort the row; every problem is
/// appended so the caller sees the exhaustive error list.
fn parse_row(fields: &[String], mapping: &ColumnMapping, row: usize) -> ParsedImportRecord {
    let mut errors = Vec::new();

    let (cognome, nome) = match split_docente(cell(fields, mapping.docente)) {
        Some(v) => v,
        None => {
            errors.push(
                "docente: expected \"Cognome Nome\" or \"Cognome, Nome\"".to_string(),
            );
            (String::new(), String::new())
        }
    };

    let minuti_settimana = match parse_decimal(cell(fields, mapping.minuti_settimana)) {
        Some(v) if v >= 0.0 => v,
        Some(v) => {
            errors.push(format!("minutiSettimana: must not be negative (got {})", v));
            0.0
        }
        None => {
            errors.push("minutiSettimana: not a number".to_string());
            0.0
        }
    };

    let minuti_annui = match parse_decimal(cell(fields, mapping.tesoretto_annuale)) {
        Some(v) if v >= 0.0 => v,
        Some(v) => {
            errors.push(format!("tesorettoAnnuale: must not be negative (got {})", v));
            0.0
        }
        None => {
            errors.push("tesorettoAnnuale: not a number".to_string());
            0.0
        }
    };

    // moduliAnnui and saldo fall back to values derived from the tesoretto
    // when their column is absent or the cell is blank.
    let moduli_annui = match mapping.moduli_annui.map(|i| cell(fields, i)) {
        Some(raw) if !raw.trim().is_empty() => match parse_decimal(raw) {
            Some(v) if v >= 0.0 => v,
            Some(v) => {
                errors.push(format!("moduliAnnui: must not be negative (got {})", v));
                round2(minuti_annui / MODULE_MINUTES)
            }
            None => {
                errors.push("moduliAnnui: not a number".to_string());
                round2(minuti_annui / MODULE_MINUTES)
            }
        },
        _ => round2(minuti_annui / MODULE_MINUTES),
    };

    let saldo = match mapping.saldo.map(|i| cell(fields, i)) {
        Some(raw) if !raw.trim().is_empty() => match parse_decimal(raw) {
            Some(v) => v,
            None => {
                errors.push("saldo: not a number".to_string());
                minuti_annui
            }
        },
        _ => minuti_annui,
    };

    let email = mapping
        .email
        .map(|i| cell(fields, i))
        .and_then(non_empty_trimmed);

    ParsedImportRecord {
        cognome,
        nome,
        email,
        minuti_settimana,
        minuti_annui,
        moduli_annui,
        saldo,
        row,
        errors,
    }
}

/// Build the full preview from raw tabular text: resolve the column mapping
/// from the first non-blank line, parse every data row, flag in-batch
/// duplicates, and aggregate the stats. Never touches storage.
pub fn build_preview(content: &str) -> ImportPreview {
    let lines: Vec<&str> = content.lines().collect();
    let header_pos = match lines.iter().position(|l| !l.trim().is_empty()) {
        Some(p) => p,
        None => return ImportPreview::failed(vec!["empty input".to_string()]),
    };

    let delim = detect_delimiter(lines[header_pos]);
    let header = parse_record(lines[header_pos], delim);
    let mapping = match resolve_column_mapping(&header) {
        Ok(m) => m,
        Err(errors) => return ImportPreview::failed(errors),
    };

    let mut records: Vec<ParsedImportRecord> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = 0usize;

    for (offset, line) in lines[header_pos + 1..].iter().enumerate() {
        // Data rows are numbered by file position so errors point at real
        // rows; blank rows are skipped but still advance the index.
        let row = offset + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_record(line, delim);
        if fields.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let mut record = parse_row(&fields, &mapping, row);
        if !record.cognome.is_empty() {
            let key = normalized_name_key(&record.cognome, &record.nome);
            match seen.get(&key) {
                Some(first) => {
                    duplicates += 1;
                    record
                        .errors
                        .push(format!("duplicate of row {}", first));
                }
                None => {
                    seen.insert(key, row);
                }
            }
        }
        records.push(record);
    }

    let total_rows = records.len();
    let error_rows = records.iter().filter(|r| !r.is_valid()).count();
    ImportPreview {
        stats: ImportStats {
            total_rows,
            valid_rows: total_rows - error_rows,
            error_rows,
            duplicates,
        },
        records,
        errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mapping_resolves_in_any_column_order() {
        let h = headers(&[
            "saldo",
            "tesorettoAnnuale",
            "docente",
            "moduliAnnui",
            "minutiSettimana",
        ]);
        let m = resolve_column_mapping(&h).expect("mapping");
        assert_eq!(m.docente, 2);
        assert_eq!(m.minuti_settimana, 4);
        assert_eq!(m.tesoretto_annuale, 1);
        assert_eq!(m.moduli_annui, Some(3));
        assert_eq!(m.saldo, Some(0));
        assert_eq!(m.email, None);
    }

    #[test]
    fn mapping_tolerates_case_and_separators() {
        let h = headers(&[
            "Docente",
            "Minuti Settimana",
            "TESORETTO_ANNUALE",
            "moduli-annui",
            "Saldo",
            "E-Mail",
        ]);
        let m = resolve_column_mapping(&h).expect("mapping");
        assert_eq!(m.minuti_settimana, 1);
        assert_eq!(m.tesoretto_annuale, 2);
        assert_eq!(m.moduli_annui, Some(3));
        assert_eq!(m.email, Some(5));
    }

    #[test]
    fn mapping_reports_every_missing_required_column() {
        let h = headers(&["docente", "saldo"]);
        let errs = resolve_column_mapping(&h).expect_err("should fail");
        assert_eq!(errs.len(), 2);
        assert!(errs[0].contains("minutiSettimana"));
        assert!(errs[1].contains("tesorettoAnnuale"));
    }

    #[test]
    fn missing_column_is_a_global_error_and_skips_rows() {
        let preview = build_preview("docente,saldo\nRossi Mario,100\n");
        assert!(preview.records.is_empty());
        assert_eq!(preview.stats, ImportStats::default());
        assert!(!preview.errors.is_empty());
    }

    #[test]
    fn example_row_parses_with_derived_fields_intact() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale,moduliAnnui,saldo\n\
             \"Rossi Mario\",1000,36000,720,36000\n",
        );
        assert_eq!(preview.stats.valid_rows, 1);
        let r = &preview.records[0];
        assert!(r.errors.is_empty(), "unexpected errors: {:?}", r.errors);
        assert_eq!(r.cognome, "Rossi");
        assert_eq!(r.nome, "Mario");
        assert_eq!(r.minuti_settimana, 1000.0);
        assert_eq!(r.minuti_annui, 36000.0);
        assert_eq!(r.moduli_annui, 720.0);
        assert_eq!(r.saldo, 36000.0);
    }

    #[test]
    fn modules_and_saldo_derive_from_tesoretto_when_absent() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale\nBianchi Anna,50,125\n",
        );
        let r = &preview.records[0];
        assert!(r.is_valid());
        assert_eq!(r.moduli_annui, round2(125.0 / MODULE_MINUTES));
        assert_eq!(r.moduli_annui, 2.5);
        assert_eq!(r.saldo, 125.0);
    }

    #[test]
    fn modules_round_to_two_decimals() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale\nVerdi Luca,10,33.3\n",
        );
        let r = &preview.records[0];
        // 33.3 / 50 = 0.666
        assert_eq!(r.moduli_annui, 0.67);
    }

    #[test]
    fn comma_decimal_separator_is_accepted() {
        let preview = build_preview(
            "docente;minutiSettimana;tesorettoAnnuale;saldo\n\
             Rossi Mario;12,5;1.234,5;900,25\n",
        );
        let r = &preview.records[0];
        assert!(r.is_valid(), "errors: {:?}", r.errors);
        assert_eq!(r.minuti_settimana, 12.5);
        assert_eq!(r.minuti_annui, 1234.5);
        assert_eq!(r.saldo, 900.25);
    }

    #[test]
    fn comma_name_convention_keeps_multiword_surname() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale\n\"De Luca, Maria\",60,3000\n",
        );
        let r = &preview.records[0];
        assert_eq!(r.cognome, "De Luca");
        assert_eq!(r.nome, "Maria");
    }

    #[test]
    fn all_field_errors_are_collected_per_row() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale\nRossi,abc,-5\n",
        );
        let r = &preview.records[0];
        assert_eq!(r.errors.len(), 3, "errors: {:?}", r.errors);
        assert_eq!(preview.stats.error_rows, 1);
        assert_eq!(preview.stats.valid_rows, 0);
    }

    #[test]
    fn duplicate_rows_are_flagged_and_excluded_from_valid() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale\n\
             Rossi Mario,100,5000\n\
             Bianchi Anna,100,5000\n\
             rossi MARIO,200,6000\n",
        );
        assert_eq!(preview.stats.total_rows, 3);
        assert_eq!(preview.stats.duplicates, 1);
        assert_eq!(preview.stats.valid_rows, 2);
        assert_eq!(preview.stats.error_rows, 1);
        let dup = &preview.records[2];
        assert_eq!(dup.errors, vec!["duplicate of row 1".to_string()]);
    }

    #[test]
    fn blank_rows_are_skipped_but_keep_row_numbering() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale\n\
             Rossi Mario,100,5000\n\
             \n\
             ,,\n\
             Bianchi Anna,100,5000\n",
        );
        assert_eq!(preview.stats.total_rows, 2);
        assert_eq!(preview.records[0].row, 1);
        assert_eq!(preview.records[1].row, 4);
    }

    #[test]
    fn every_row_counts_as_exactly_valid_or_error() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale\n\
             Rossi Mario,100,5000\n\
             Bianchi,100,5000\n\
             Rossi Mario,100,5000\n\
             Verdi Luca,x,5000\n",
        );
        assert_eq!(
            preview.stats.valid_rows + preview.stats.error_rows,
            preview.stats.total_rows
        );
        assert_eq!(preview.stats.valid_rows, 1);
        assert_eq!(preview.stats.error_rows, 3);
    }

    #[test]
    fn empty_input_is_a_global_error() {
        let preview = build_preview("\n  \n");
        assert_eq!(preview.errors, vec!["empty input".to_string()]);
        assert!(preview.records.is_empty());
    }

    #[test]
    fn email_column_is_picked_up_when_present() {
        let preview = build_preview(
            "docente,minutiSettimana,tesorettoAnnuale,email\n\
             Rossi Mario,100,5000,m.rossi@scuola.it\n\
             Bianchi Anna,100,5000,\n",
        );
        assert_eq!(
            preview.records[0].email.as_deref(),
            Some("m.rossi@scuola.it")
        );
        assert_eq!(preview.records[1].email, None);
    }
}
