//! Model parameters and labelled samples, plus the plain (unproved)
//! evaluation of the model.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::DataError,
    fixed_point::{encode, Precision},
    lookup::sigmoid,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub w: f64,
    pub b: f64,
}

/// W and B at the value precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedModel {
    pub w: i128,
    pub b: i128,
}

impl ModelParameters {
    pub fn encode(&self, precision: &Precision) -> EncodedModel {
        EncodedModel {
            w: encode(self.w, precision.value_bits),
            b: encode(self.b, precision.value_bits),
        }
    }

    pub fn linear(&self, x: f64) -> f64 {
        self.w * x + self.b
    }

    pub fn predict(&self, x: f64) -> u8 {
        (sigmoid(self.linear(x)) >= 0.5) as u8
    }

    /// Fraction of `samples` whose label matches the prediction.
    pub fn accuracy(&self, samples: &[Sample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let correct = samples
            .iter()
            .filter(|s| self.predict(s.feature) == s.label)
            .count();
        correct as f64 / samples.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub feature: f64,
    pub label: u8,
}

impl Sample {
    /// The feature at the value precision, or `None` if it is not finite or
    /// falls outside the signed range.
    pub fn encoded_feature(&self, precision: &Precision) -> Option<i128> {
        let x = encode(self.feature, precision.value_bits);
        (self.feature.is_finite() && precision.in_range(x)).then_some(x)
    }
}

fn open(path: &Path) -> Result<File, DataError> {
    File::open(path).map_err(|source| DataError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads `feature,label` records. The first line is a header. Features must
/// be finite and encode within `precision`'s signed range.
pub fn load_dataset(
    path: impl AsRef<Path>,
    precision: &Precision,
) -> Result<Vec<Sample>, DataError> {
    let path = path.as_ref();
    parse_dataset(BufReader::new(open(path)?), precision).map_err(|err| match err {
        DataError::Read { source, .. } => DataError::Read {
            path: path.to_path_buf(),
            source,
        },
        err => err,
    })
}

pub fn parse_dataset<R: BufRead>(
    reader: R,
    precision: &Precision,
) -> Result<Vec<Sample>, DataError> {
    let mut samples = vec![];
    for (i, line) in reader.lines().enumerate().skip(1) {
        let line = line.map_err(|source| DataError::Read {
            path: Default::default(),
            source,
        })?;
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let parse_err = |message: String| DataError::Parse {
            line: line_no,
            message,
        };

        let mut fields = line.split(',').map(str::trim);
        let (Some(feature), Some(label)) = (fields.next(), fields.next()) else {
            return Err(parse_err("expected `feature,label`".to_string()));
        };
        let feature: f64 = feature
            .parse()
            .map_err(|err| parse_err(format!("invalid feature {feature:?}: {err}")))?;
        let label = match label {
            "0" => 0,
            "1" => 1,
            other => return Err(parse_err(format!("label must be 0 or 1, got {other:?}"))),
        };
        let sample = Sample { feature, label };
        if sample.encoded_feature(precision).is_none() {
            return Err(parse_err(format!(
                "feature {feature} is outside the fixed-point range"
            )));
        }
        samples.push(sample);
    }
    Ok(samples)
}

/// Reads `W: <float>` and `B: <float>` from the first two lines.
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelParameters, DataError> {
    let path = path.as_ref();
    let mut content = String::new();
    open(path)?
        .read_to_string(&mut content)
        .map_err(|source| DataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_model(&content)
}

pub fn parse_model(content: &str) -> Result<ModelParameters, DataError> {
    let mut lines = content.lines();
    let mut field = |line: usize, prefix: &str| -> Result<f64, DataError> {
        let text = lines.next().unwrap_or_default();
        let value = text.strip_prefix(prefix).ok_or_else(|| DataError::Parse {
            line,
            message: format!("expected `{prefix}<float>`, got {text:?}"),
        })?;
        let parsed: f64 = value.trim().parse().map_err(|err| DataError::Parse {
            line,
            message: format!("invalid value {value:?}: {err}"),
        })?;
        if !parsed.is_finite() {
            return Err(DataError::Parse {
                line,
                message: format!("value {parsed} is not finite"),
            });
        }
        Ok(parsed)
    };
    let w = field(1, "W: ")?;
    let b = field(2, "B: ")?;
    Ok(ModelParameters { w, b })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dataset() {
        let csv = "marks,label\n45,1\n\n72.5, 0\n";
        let samples = parse_dataset(csv.as_bytes(), &Precision::default()).unwrap();
        assert_eq!(
            samples,
            vec![
                Sample { feature: 45.0, label: 1 },
                Sample { feature: 72.5, label: 0 }
            ]
        );
    }

    #[test]
    fn test_parse_dataset_errors_name_the_line() {
        let p = Precision::default();
        let err = parse_dataset("marks,label\n45,1\n50,2\n".as_bytes(), &p).unwrap_err();
        assert!(matches!(err, DataError::Parse { line: 3, .. }), "{err}");
        let err = parse_dataset("marks,label\nabc,1\n".as_bytes(), &p).unwrap_err();
        assert!(matches!(err, DataError::Parse { line: 2, .. }), "{err}");
        let err = parse_dataset("marks,label\n45\n".as_bytes(), &p).unwrap_err();
        assert!(matches!(err, DataError::Parse { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_unrepresentable_features_are_rejected() {
        let p = Precision::default();
        for (csv, line) in [
            ("marks,label\n45,1\ninf,1\n", 3),
            ("marks,label\nNaN,0\n", 2),
            ("marks,label\n45,1\n50,0\n-infinity,1\n", 4),
            ("marks,label\n1e20,1\n", 2),
        ] {
            let err = parse_dataset(csv.as_bytes(), &p).unwrap_err();
            assert!(matches!(err, DataError::Parse { line: l, .. } if l == line), "{err}");
        }
        // 2^31 is the first feature past a Q32 value in a 64-bit signed range
        assert!(parse_dataset("marks,label\n2147483647,1\n".as_bytes(), &p).is_ok());
        assert!(parse_dataset("marks,label\n2147483648,1\n".as_bytes(), &p).is_err());
    }

    #[test]
    fn test_parse_model() {
        let model = parse_model("W: -0.85735312\nB: 50.94705066\n").unwrap();
        assert_eq!(model.w, -0.85735312);
        assert_eq!(model.b, 50.94705066);

        assert!(matches!(
            parse_model("B: 1.0\nW: 2.0\n"),
            Err(DataError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_model("W: 1.0\n"),
            Err(DataError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            parse_model("W: 1.0\nB: NaN\n"),
            Err(DataError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_dataset("does/not/exist.csv", &Precision::default()),
            Err(DataError::Open { .. })
        ));
    }

    #[test]
    fn test_plain_prediction() {
        let model = ModelParameters {
            w: -0.85735312,
            b: 50.94705066,
        };
        assert_eq!(model.predict(59.0), 1);
        assert_eq!(model.predict(60.0), 0);
        let samples = [
            Sample { feature: 30.0, label: 1 },
            Sample { feature: 90.0, label: 0 },
            Sample { feature: 90.0, label: 1 },
            Sample { feature: 10.0, label: 1 },
        ];
        assert_eq!(model.accuracy(&samples), 0.75);
    }
}
