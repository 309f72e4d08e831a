//! Measurement publishing
//!
//! The node hands every decoded weight to a [`MeasurementSink`] together with
//! the topic name. Delivery guarantees belong to the sink.

use protocol::WeightMeasurement;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Destination for named weight measurements
pub trait MeasurementSink: Send {
    /// Publish one weight on `topic`
    fn publish(&mut self, topic: &str, weight: WeightMeasurement) -> crate::Result<()>;
}

/// Wire form of one published measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightMessage {
    pub topic: String,
    pub data: f64,
}

/// Writes one JSON object per measurement, newline-delimited
///
/// With stdout as the writer, any bus bridge (`mosquitto_pub -l`, a ROS
/// bridge, a pipe into another process) can pick the stream up unchanged.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> MeasurementSink for JsonLinesSink<W> {
    fn publish(&mut self, topic: &str, weight: WeightMeasurement) -> crate::Result<()> {
        let message = WeightMessage {
            topic: topic.to_string(),
            data: weight.value(),
        };

        serde_json::to_writer(&mut self.writer, &message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines_format() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.publish("/scale/weight", WeightMeasurement::from_raw(100, -2))
            .unwrap();
        sink.publish("/scale/weight", WeightMeasurement::from_raw(5, 2))
            .unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"topic":"/scale/weight","data":1.0}"#);

        let second: WeightMessage = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.data, 500.0);
    }
}
