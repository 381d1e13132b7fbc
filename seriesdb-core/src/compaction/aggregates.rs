//! Aggregation state machines
//!
//! Each variant keeps the minimal statistics needed to summarize one bucket
//! plus whether any sample was seen. The same contexts back compaction rules
//! and aggregated range queries.

use crate::codec::{RecordReader, RecordWriter};
use crate::{AggregationType, Result, SeriesError};

/// Incremental accumulator for one bucket
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationContext {
    /// Disabled rule, never accumulates
    None,
    Min { value: f64, seen: bool },
    Max { value: f64, seen: bool },
    Sum { value: f64, seen: bool },
    Avg { sum: f64, count: u64 },
    Count { count: u64 },
    First { value: f64, seen: bool },
    Last { value: f64, seen: bool },
    Range { min: f64, max: f64, seen: bool },
}

impl AggregationContext {
    /// Create an empty context for a variant
    pub fn new(agg: AggregationType) -> Self {
        match agg {
            AggregationType::None => AggregationContext::None,
            AggregationType::Min => AggregationContext::Min { value: 0.0, seen: false },
            AggregationType::Max => AggregationContext::Max { value: 0.0, seen: false },
            AggregationType::Sum => AggregationContext::Sum { value: 0.0, seen: false },
            AggregationType::Avg => AggregationContext::Avg { sum: 0.0, count: 0 },
            AggregationType::Count => AggregationContext::Count { count: 0 },
            AggregationType::First => AggregationContext::First { value: 0.0, seen: false },
            AggregationType::Last => AggregationContext::Last { value: 0.0, seen: false },
            AggregationType::Range => AggregationContext::Range {
                min: 0.0,
                max: 0.0,
                seen: false,
            },
        }
    }

    /// Variant this context implements
    pub fn agg_type(&self) -> AggregationType {
        match self {
            AggregationContext::None => AggregationType::None,
            AggregationContext::Min { .. } => AggregationType::Min,
            AggregationContext::Max { .. } => AggregationType::Max,
            AggregationContext::Sum { .. } => AggregationType::Sum,
            AggregationContext::Avg { .. } => AggregationType::Avg,
            AggregationContext::Count { .. } => AggregationType::Count,
            AggregationContext::First { .. } => AggregationType::First,
            AggregationContext::Last { .. } => AggregationType::Last,
            AggregationContext::Range { .. } => AggregationType::Range,
        }
    }

    /// Feed one value
    pub fn add(&mut self, v: f64) {
        match self {
            AggregationContext::None => {}
            AggregationContext::Min { value, seen } => {
                *value = if *seen { value.min(v) } else { v };
                *seen = true;
            }
            AggregationContext::Max { value, seen } => {
                *value = if *seen { value.max(v) } else { v };
                *seen = true;
            }
            AggregationContext::Sum { value, seen } => {
                *value += v;
                *seen = true;
            }
            AggregationContext::Avg { sum, count } => {
                *sum += v;
                *count += 1;
            }
            AggregationContext::Count { count } => *count += 1,
            AggregationContext::First { value, seen } => {
                if !*seen {
                    *value = v;
                    *seen = true;
                }
            }
            AggregationContext::Last { value, seen } => {
                *value = v;
                *seen = true;
            }
            AggregationContext::Range { min, max, seen } => {
                if *seen {
                    *min = min.min(v);
                    *max = max.max(v);
                } else {
                    *min = v;
                    *max = v;
                    *seen = true;
                }
            }
        }
    }

    /// Check if no sample was fed since the last reset
    pub fn is_empty(&self) -> bool {
        match self {
            AggregationContext::None => true,
            AggregationContext::Avg { count, .. } | AggregationContext::Count { count } => *count == 0,
            AggregationContext::Min { seen, .. }
            | AggregationContext::Max { seen, .. }
            | AggregationContext::Sum { seen, .. }
            | AggregationContext::First { seen, .. }
            | AggregationContext::Last { seen, .. }
            | AggregationContext::Range { seen, .. } => !*seen,
        }
    }

    /// Produce the bucket value
    pub fn finalize(&self) -> Result<f64> {
        if self.is_empty() {
            return Err(SeriesError::EmptyAggregation(self.agg_type().to_string()));
        }
        match self {
            AggregationContext::None => Err(SeriesError::EmptyAggregation(
                AggregationType::None.to_string(),
            )),
            AggregationContext::Min { value, .. }
            | AggregationContext::Max { value, .. }
            | AggregationContext::Sum { value, .. }
            | AggregationContext::First { value, .. }
            | AggregationContext::Last { value, .. } => Ok(*value),
            AggregationContext::Avg { sum, count } => Ok(*sum / *count as f64),
            AggregationContext::Count { count } => Ok(*count as f64),
            AggregationContext::Range { min, max, .. } => Ok(*max - *min),
        }
    }

    /// Clear accumulated state
    pub fn reset(&mut self) {
        *self = AggregationContext::new(self.agg_type());
    }

    /// Write the variant-specific state
    pub fn encode(&self, writer: &mut RecordWriter) {
        match self {
            AggregationContext::None => {}
            AggregationContext::Min { value, seen }
            | AggregationContext::Max { value, seen }
            | AggregationContext::Sum { value, seen }
            | AggregationContext::First { value, seen }
            | AggregationContext::Last { value, seen } => {
                writer.put_bool(*seen);
                writer.put_double(*value);
            }
            AggregationContext::Avg { sum, count } => {
                writer.put_double(*sum);
                writer.put_unsigned(*count);
            }
            AggregationContext::Count { count } => writer.put_unsigned(*count),
            AggregationContext::Range { min, max, seen } => {
                writer.put_bool(*seen);
                writer.put_double(*min);
                writer.put_double(*max);
            }
        }
    }

    /// Read the state written by [`encode`](Self::encode) for `agg`
    pub fn decode(agg: AggregationType, reader: &mut RecordReader<'_>) -> Result<Self> {
        let mut ctx = AggregationContext::new(agg);
        match &mut ctx {
            AggregationContext::None => {}
            AggregationContext::Min { value, seen }
            | AggregationContext::Max { value, seen }
            | AggregationContext::Sum { value, seen }
            | AggregationContext::First { value, seen }
            | AggregationContext::Last { value, seen } => {
                *seen = reader.get_bool("aggregation seen flag")?;
                *value = reader.get_double("aggregation value")?;
            }
            AggregationContext::Avg { sum, count } => {
                *sum = reader.get_double("avg sum")?;
                *count = reader.get_unsigned("avg count")?;
            }
            AggregationContext::Count { count } => {
                *count = reader.get_unsigned("count")?;
            }
            AggregationContext::Range { min, max, seen } => {
                *seen = reader.get_bool("range seen flag")?;
                *min = reader.get_double("range min")?;
                *max = reader.get_double("range max")?;
            }
        }
        Ok(ctx)
    }
}
