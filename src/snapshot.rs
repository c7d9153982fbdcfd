use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Short volume identifier: a drive letter on Windows, a block device name on Linux.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<char> for VolumeId {
    fn from(letter: char) -> Self {
        Self(letter.to_string())
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bytes read and written on one volume since its previous successful sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeIoStat {
    pub volume_id: VolumeId,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl VolumeIoStat {
    pub fn new(volume_id: impl Into<VolumeId>, bytes_read: u64, bytes_written: u64) -> Self {
        Self {
            volume_id: volume_id.into(),
            bytes_read,
            bytes_written,
        }
    }
}

#[derive(Serialize)]
struct IoCounters {
    bytes_read: u64,
    bytes_written: u64,
}

impl Serialize for VolumeIoStat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(
            self.volume_id.as_str(),
            &IoCounters {
                bytes_read: self.bytes_read,
                bytes_written: self.bytes_written,
            },
        )?;
        map.end()
    }
}

/// One validated collection result. Field order here is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    cpu_percent: f32,
    memory_percent: f32,
    process_count: u32,
    #[serde(rename = "volumme_io", skip_serializing_if = "Vec::is_empty")]
    volume_io: Vec<VolumeIoStat>,
}

impl Snapshot {
    /// Builds a snapshot, rejecting any out-of-range field.
    ///
    /// Negative CPU readings are clamped to zero instead of rejected; every
    /// other violation fails the whole snapshot.
    pub fn new(
        cpu_percent: f32,
        memory_percent: f32,
        process_count: u32,
        volume_io: Vec<VolumeIoStat>,
    ) -> Result<Self, SnapshotError> {
        Ok(Self {
            cpu_percent: validate_cpu_percent(cpu_percent)?,
            memory_percent: validate_percent("memory_percent", memory_percent)?,
            process_count: validate_process_count(process_count)?,
            volume_io,
        })
    }

    pub fn cpu_percent(&self) -> f32 {
        self.cpu_percent
    }

    pub fn memory_percent(&self) -> f32 {
        self.memory_percent
    }

    pub fn process_count(&self) -> u32 {
        self.process_count
    }

    pub fn volume_io(&self) -> &[VolumeIoStat] {
        &self.volume_io
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn validate_cpu_percent(value: f32) -> Result<f32, SnapshotError> {
    if value < 0.0 {
        return Ok(0.0);
    }
    validate_percent("cpu_percent", value)
}

fn validate_percent(field: &'static str, value: f32) -> Result<f32, SnapshotError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(SnapshotError::OutOfRange {
            field,
            value: value as f64,
        });
    }
    Ok(value)
}

fn validate_process_count(value: u32) -> Result<u32, SnapshotError> {
    if value == 0 {
        return Err(SnapshotError::OutOfRange {
            field: "process_count",
            value: 0.0,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_volumes() -> Vec<VolumeIoStat> {
        vec![
            VolumeIoStat::new('C', 1123, 3321),
            VolumeIoStat::new('D', 0, 3321),
            VolumeIoStat::new('E', 1, 0),
            VolumeIoStat::new('F', 0, 0),
        ]
    }

    #[test]
    fn serializes_fields_in_wire_order() {
        let snapshot = Snapshot::new(1.0, 55.0, 34, sample_volumes()).unwrap();
        assert_eq!(
            snapshot.to_json().unwrap(),
            concat!(
                r#"{"cpu_percent":1.0,"memory_percent":55.0,"process_count":34,"volumme_io":["#,
                r#"{"C":{"bytes_read":1123,"bytes_written":3321}},"#,
                r#"{"D":{"bytes_read":0,"bytes_written":3321}},"#,
                r#"{"E":{"bytes_read":1,"bytes_written":0}},"#,
                r#"{"F":{"bytes_read":0,"bytes_written":0}}]}"#
            )
        );
    }

    #[test]
    fn serialization_is_deterministic() {
        let snapshot = Snapshot::new(12.5, 40.25, 7, sample_volumes()).unwrap();
        let first = snapshot.to_json().unwrap();
        let second = snapshot.clone().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn omits_volume_field_without_volumes() {
        let snapshot = Snapshot::new(3.5, 20.0, 1, Vec::new()).unwrap();
        assert_eq!(
            snapshot.to_json().unwrap(),
            r#"{"cpu_percent":3.5,"memory_percent":20.0,"process_count":1}"#
        );
    }

    #[test]
    fn negative_cpu_is_clamped_to_zero() {
        let snapshot = Snapshot::new(-5.0, 10.0, 1, Vec::new()).unwrap();
        assert_eq!(snapshot.cpu_percent(), 0.0);
    }

    #[test]
    fn cpu_above_hundred_is_rejected() {
        let err = Snapshot::new(150.0, 10.0, 1, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::OutOfRange {
                field: "cpu_percent",
                value: 150.0
            }
        );
    }

    #[test]
    fn memory_out_of_range_is_rejected_not_clamped() {
        assert!(Snapshot::new(1.0, -0.5, 1, Vec::new()).is_err());
        assert!(Snapshot::new(1.0, 100.5, 1, Vec::new()).is_err());
        assert!(Snapshot::new(1.0, f32::NAN, 1, Vec::new()).is_err());
        assert!(Snapshot::new(1.0, 100.0, 1, Vec::new()).is_ok());
    }

    #[test]
    fn zero_process_count_is_rejected() {
        let err = Snapshot::new(1.0, 1.0, 0, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::OutOfRange {
                field: "process_count",
                ..
            }
        ));
        assert!(Snapshot::new(1.0, 1.0, 1, Vec::new()).is_ok());
    }
}
