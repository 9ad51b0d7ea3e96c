use crate::error::TransformError;
use crate::record::Record;
use async_trait::async_trait;

/// A single remote transformer: an `encode`/
/// `decode` pair applied at the remote boundary, e.g. to derive a server id
/// from a local one and back, or to encrypt/decrypt a payload. Both sides
/// run per record, including tombstones.
#[async_trait(?Send)]
pub trait RecordTransformer {
    async fn encode(&self, record: Record) -> Result<Record, TransformError>;
    async fn decode(&self, record: Record) -> Result<Record, TransformError>;
}

/// An ordered chain of [`RecordTransformer`]s. Encoding runs in registration
/// order (local → remote); decoding runs in reverse (remote → local).
#[derive(Default)]
pub struct TransformerPipeline {
    transformers: Vec<Box<dyn RecordTransformer>>,
}

impl TransformerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transformer: Box<dyn RecordTransformer>) {
        self.transformers.push(transformer);
    }

    pub async fn encode(&self, mut record: Record) -> Result<Record, TransformError> {
        for transformer in &self.transformers {
            record = transformer.encode(record).await?;
        }
        Ok(record)
    }

    pub async fn decode(&self, mut record: Record) -> Result<Record, TransformError> {
        for transformer in self.transformers.iter().rev() {
            record = transformer.decode(record).await?;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Suffix(&'static str);

    #[async_trait(?Send)]
    impl RecordTransformer for Suffix {
        async fn encode(&self, mut record: Record) -> Result<Record, TransformError> {
            let prior = record.get("trace").and_then(|v| v.as_str()).unwrap_or("").to_string();
            record.set("trace", json!(format!("{prior}enc{}", self.0)));
            Ok(record)
        }

        async fn decode(&self, mut record: Record) -> Result<Record, TransformError> {
            let prior = record.get("trace").and_then(|v| v.as_str()).unwrap_or("").to_string();
            record.set("trace", json!(format!("{prior}dec{}", self.0)));
            Ok(record)
        }
    }

    #[tokio::test]
    async fn encode_runs_in_order_decode_runs_reversed() {
        let mut pipeline = TransformerPipeline::new();
        pipeline.push(Box::new(Suffix("A")));
        pipeline.push(Box::new(Suffix("B")));

        let mut record = Record::new();
        record.set_id("1");
        let encoded = pipeline.encode(record).await.unwrap();
        assert_eq!(encoded.get("trace").unwrap().as_str().unwrap(), "encAencB");

        let decoded = pipeline.decode(encoded).await.unwrap();
        assert_eq!(
            decoded.get("trace").unwrap().as_str().unwrap(),
            "encAencBdecBdecA"
        );
    }
}
