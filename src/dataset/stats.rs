// Column statistics over a loaded dataset

use std::collections::HashMap;

use serde::Serialize;

use super::{is_missing, parse_number, Dataset};

#[derive(Debug, Clone, Serialize)]
pub struct DescribeRow {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub dtype: &'static str,
    pub non_null: usize,
    pub missing: usize,
}

impl Dataset {
    /// Numeric summary per column. With no explicit columns every numeric
    /// column is described; explicitly named columns must exist and be numeric.
    pub fn describe(&self, columns: Option<&[String]>) -> Result<Vec<DescribeRow>, String> {
        let indices: Vec<usize> = match columns {
            Some(names) if !names.is_empty() => {
                let mut out = Vec::with_capacity(names.len());
                for name in names {
                    let idx = self.require_column(name)?;
                    if !self.columns[idx].kind.is_numeric() {
                        return Err(format!(
                            "Column '{}' has dtype {} and cannot be described numerically",
                            name,
                            self.columns[idx].kind.dtype()
                        ));
                    }
                    out.push(idx);
                }
                out
            }
            _ => self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.kind.is_numeric())
                .map(|(idx, _)| idx)
                .collect(),
        };

        let mut rows = Vec::new();
        for idx in indices {
            let mut values: Vec<f64> = self.column_values(idx).filter_map(parse_number).collect();
            if values.is_empty() {
                continue;
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let count = values.len();
            let mean = values.iter().sum::<f64>() / count as f64;
            rows.push(DescribeRow {
                column: self.columns[idx].name.clone(),
                count,
                mean,
                std_dev: std_dev(&values, mean),
                min: values[0],
                q25: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q75: quantile(&values, 0.75),
                max: values[count - 1],
            });
        }
        Ok(rows)
    }

    /// Distinct values with their counts, most frequent first. Ties keep
    /// first-appearance order. Missing cells are excluded.
    pub fn value_counts(&self, column: &str, limit: usize) -> Result<Vec<(String, usize)>, String> {
        let idx = self.require_column(column)?;
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for cell in self.column_values(idx) {
            if is_missing(cell) {
                continue;
            }
            let entry = counts.entry(cell).or_insert(0);
            if *entry == 0 {
                order.push(cell.to_string());
            }
            *entry += 1;
        }
        let mut out: Vec<(String, usize)> = order
            .into_iter()
            .map(|v| {
                let n = counts.get(v.as_str()).copied().unwrap_or(0);
                (v, n)
            })
            .collect();
        // stable sort keeps first-appearance order among ties
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out.truncate(limit);
        Ok(out)
    }

    /// Distinct non-missing values in first-appearance order.
    pub fn unique(&self, column: &str) -> Result<Vec<String>, String> {
        let idx = self.require_column(column)?;
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .column_values(idx)
            .filter(|c| !is_missing(c))
            .filter(|c| seen.insert(*c))
            .map(|c| c.to_string())
            .collect())
    }

    pub fn missing_values(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let missing = self.column_values(idx).filter(|c| is_missing(c)).count();
                ColumnSummary {
                    column: col.name.clone(),
                    dtype: col.kind.dtype(),
                    non_null: self.row_count() - missing,
                    missing,
                }
            })
            .collect()
    }

    /// Pearson correlation over rows where both cells are numeric.
    pub fn correlation(&self, left: &str, right: &str) -> Result<f64, String> {
        let li = self.require_column(left)?;
        let ri = self.require_column(right)?;
        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .rows
            .iter()
            .filter_map(|r| Some((parse_number(&r[li])?, parse_number(&r[ri])?)))
            .unzip();
        if xs.len() < 2 {
            return Err(format!(
                "Need at least two rows where both '{}' and '{}' are numeric",
                left, right
            ));
        }
        Ok(correlation(&xs, &ys))
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    variance.sqrt()
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    let mean_x = x.iter().take(n).sum::<f64>() / n as f64;
    let mean_y = y.iter().take(n).sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut denom_x = 0.0;
    let mut denom_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        num += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }
    if denom_x == 0.0 || denom_y == 0.0 {
        f64::NAN
    } else {
        num / (denom_x.sqrt() * denom_y.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let data = "city,temp,rain\nOslo,1,10\nRome,15,\nOslo,3,12\nLima,19,1\nOslo,2,9\n";
        Dataset::from_csv_bytes("weather.csv", data.as_bytes()).unwrap()
    }

    #[test]
    fn test_describe_numeric_columns() {
        let rows = sample().describe(None).unwrap();
        assert_eq!(rows.len(), 2);
        let temp = &rows[0];
        assert_eq!(temp.column, "temp");
        assert_eq!(temp.count, 5);
        assert!((temp.mean - 8.0).abs() < 1e-9);
        assert_eq!(temp.min, 1.0);
        assert_eq!(temp.q25, 2.0);
        assert_eq!(temp.median, 3.0);
        assert_eq!(temp.q75, 15.0);
        assert_eq!(temp.max, 19.0);
        // rain skips the missing cell
        assert_eq!(rows[1].count, 4);
        assert!((rows[1].q25 - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_describe_rejects_text_column() {
        let err = sample().describe(Some(&["city".to_string()])).unwrap_err();
        assert!(err.contains("object"));
        let err = sample().describe(Some(&["nope".to_string()])).unwrap_err();
        assert!(err.contains("Available columns"));
    }

    #[test]
    fn test_value_counts_order_and_limit() {
        let counts = sample().value_counts("city", 2).unwrap();
        assert_eq!(counts, vec![("Oslo".to_string(), 3), ("Rome".to_string(), 1)]);
    }

    #[test]
    fn test_unique_and_missing() {
        let ds = sample();
        assert_eq!(ds.unique("city").unwrap(), vec!["Oslo", "Rome", "Lima"]);
        let missing = ds.missing_values();
        assert_eq!(missing[2].column, "rain");
        assert_eq!(missing[2].missing, 1);
        assert_eq!(missing[2].non_null, 4);
        assert_eq!(missing[0].dtype, "object");
    }

    #[test]
    fn test_correlation() {
        let data = "x,y,z\n1,2,5\n2,4,5\n3,6,5\n";
        let ds = Dataset::from_csv_bytes("c.csv", data.as_bytes()).unwrap();
        assert!((ds.correlation("x", "y").unwrap() - 1.0).abs() < 1e-9);
        assert!(ds.correlation("x", "z").unwrap().is_nan());
        assert!(ds.correlation("x", "w").is_err());
    }
}
