use std::collections::BTreeMap;
use std::fmt;

/// One time-series point with integer fields and second precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, i64>,
    /// Unix seconds
    pub timestamp: i64,
}

impl Point {
    pub fn new(measurement: &str, timestamp: i64) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn field(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

impl fmt::Display for Point {
    /// Line protocol: `measurement,tag=v,... field=1i,... timestamp`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape(&self.measurement, &[',', ' ']))?;
        for (key, value) in &self.tags {
            write!(f, ",{}={}", escape_key(key), escape_key(value))?;
        }

        let fields = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}i", escape_key(key), value))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, " {} {}", fields, self.timestamp)
    }
}

fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Points sent together in one write call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointBatch {
    pub points: Vec<Point>,
}

impl PointBatch {
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_line_protocol(&self) -> String {
        self.points
            .iter()
            .map(Point::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_line() {
        let point = Point::new("DnskeyAge", 1_700_000_000)
            .tag("keytype", "KSK")
            .tag("domain", "example.com.")
            .tag("algorithm", "RSASHA256")
            .tag("keytag", "12345")
            .field("age", 86400);

        assert_eq!(
            point.to_string(),
            "DnskeyAge,algorithm=RSASHA256,domain=example.com.,keytag=12345,keytype=KSK age=86400i 1700000000"
        );
    }

    #[test]
    fn test_tag_escaping() {
        let point = Point::new("m x", 1)
            .tag("domain", "a b,c=d")
            .field("age", 0);
        assert_eq!(point.to_string(), "m\\ x,domain=a\\ b\\,c\\=d age=0i 1");
    }

    #[test]
    fn test_batch_lines() {
        let mut batch = PointBatch::default();
        assert!(batch.is_empty());
        batch.push(Point::new("m", 1).field("age", 1));
        batch.push(Point::new("m", 2).field("age", -3));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.to_line_protocol(), "m age=1i 1\nm age=-3i 2");
    }
}
