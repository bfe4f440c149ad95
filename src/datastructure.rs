use crate::metrics::ComputationError;
use crate::span::RationaleTag;
use num::PrimInt;
use std::fmt::Debug;

/// Custom datastructure built for reducing cache misses. It holds the trimmed tag sequences of a
/// batch: every tag lives in the same boxed slice and `indices` holds the offset of each example,
/// followed by the total length.
#[derive(Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Clone, Default)]
pub(crate) struct TagBatch {
    pub(crate) tags: Box<[u8]>,
    pub(crate) indices: Box<[usize]>,
}

impl TagBatch {
    /// Drops the structural token at index 0 of every sequence, truncates the remainder to
    /// `lens[example]` and validates the tags that are kept. Tags beyond `lens` are padding and
    /// are never inspected. The caller makes sure `sequences` and `lens` have the same length.
    pub(crate) fn try_new<S, T>(sequences: &[S], lens: &[usize]) -> Result<Self, ComputationError>
    where
        S: AsRef<[T]>,
        T: PrimInt + Debug,
    {
        let length: usize = lens.iter().sum();
        let mut flattened = Vec::with_capacity(length);
        let mut indices = Vec::with_capacity(lens.len() + 1);
        indices.push(0);
        for (example, (sequence, &len)) in sequences.iter().zip(lens).enumerate() {
            let sequence = sequence.as_ref();
            let available = sequence.len().saturating_sub(1);
            if len > available {
                return Err(ComputationError::LengthOutOfBounds {
                    example,
                    len,
                    available,
                });
            }
            for (index, value) in sequence.iter().skip(1).take(len).enumerate() {
                let tag = RationaleTag::try_from_int(*value, index)
                    .map_err(|e| e.in_example(example))?;
                flattened.push(u8::from(tag));
            }
            indices.push(flattened.len());
        }
        Ok(Self {
            tags: flattened.into_boxed_slice(),
            indices: indices.into_boxed_slice(),
        })
    }

    /// Number of examples.
    pub(crate) fn len(&self) -> usize {
        self.indices.len().saturating_sub(1)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn iter_vec(&self) -> VecsIter<'_> {
        VecsIter::new(self)
    }
}

pub(crate) struct VecsIter<'a> {
    indice_index: usize,
    tag_batch: &'a TagBatch,
}

impl<'a> VecsIter<'a> {
    fn new(tag_batch: &'a TagBatch) -> Self {
        Self {
            indice_index: 0,
            tag_batch,
        }
    }
}

impl<'a> Iterator for VecsIter<'a> {
    type Item = &'a [u8];
    fn next(&mut self) -> Option<Self::Item> {
        let start = *self.tag_batch.indices.get(self.indice_index)?;
        let end = *self.tag_batch.indices.get(self.indice_index + 1)?;
        self.indice_index += 1;
        self.tag_batch.tags.get(start..end)
    }
}

/// This method allocates. It should only be used in the testing environment.
#[cfg(test)]
impl From<TagBatch> for Vec<Vec<u8>> {
    fn from(value: TagBatch) -> Self {
        value.iter_vec().map(Vec::from).collect()
    }
}
