use std::collections::VecDeque;

/// Fixed-capacity FIFO of the most recent raw readings.
///
/// Pushing into a full buffer evicts exactly one element, the oldest.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
  readings: VecDeque<f64>,
  capacity: usize,
}

impl SampleBuffer {
  /// Creates an empty buffer holding at most `capacity` readings.
  ///
  /// A capacity of zero is raised to one so the buffer can always produce a
  /// value.
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);

    SampleBuffer {
      readings: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Pushes a reading at the tail. Returns the evicted head, if the buffer
  /// was full.
  pub fn push(&mut self, reading: f64) -> Option<f64> {
    let evicted = if self.readings.len() == self.capacity {
      self.readings.pop_front()
    } else {
      None
    };

    self.readings.push_back(reading);
    evicted
  }

  /// Arithmetic mean of the buffered readings, or 0 when empty.
  pub fn mean(&self) -> f64 {
    if self.readings.is_empty() {
      return 0.0;
    }

    self.readings.iter().sum::<f64>() / self.readings.len() as f64
  }

  /// The mean clamped to `[0, max]`. Non-finite means collapse to 0.
  pub fn smoothed(&self, max: f64) -> f64 {
    let mean = self.mean();

    if mean.is_finite() {
      mean.clamp(0.0, max)
    } else {
      0.0
    }
  }

  pub fn len(&self) -> usize {
    self.readings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.readings.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Readings from oldest to newest.
  pub fn iter(&self) -> impl Iterator<Item = &f64> {
    self.readings.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn never_exceeds_capacity() {
    let mut buffer = SampleBuffer::new(7);

    for i in 0..100 {
      buffer.push(i as f64);
      assert!(buffer.len() <= 7);
    }

    assert_eq!(buffer.len(), 7);
  }

  #[test]
  fn evicts_oldest_first() {
    let mut buffer = SampleBuffer::new(3);

    assert_eq!(buffer.push(1.0), None);
    assert_eq!(buffer.push(2.0), None);
    assert_eq!(buffer.push(3.0), None);
    assert_eq!(buffer.push(4.0), Some(1.0));
    assert_eq!(buffer.push(5.0), Some(2.0));

    let contents: Vec<f64> = buffer.iter().copied().collect();
    assert_eq!(contents, vec![3.0, 4.0, 5.0]);
  }

  #[test]
  fn partial_buffer_averages_what_it_has() {
    let mut buffer = SampleBuffer::new(7);
    assert_eq!(buffer.mean(), 0.0);

    buffer.push(100.0);
    buffer.push(200.0);
    assert_eq!(buffer.mean(), 150.0);
  }

  #[test]
  fn smoothed_is_clamped() {
    let mut buffer = SampleBuffer::new(2);
    buffer.push(900.0);
    buffer.push(900.0);
    assert_eq!(buffer.smoothed(700.0), 700.0);

    buffer.push(-50.0);
    buffer.push(-50.0);
    assert_eq!(buffer.smoothed(700.0), 0.0);

    buffer.push(f64::NAN);
    assert_eq!(buffer.smoothed(700.0), 0.0);
  }

  #[test]
  fn zero_capacity_is_raised_to_one() {
    let mut buffer = SampleBuffer::new(0);
    buffer.push(5.0);
    assert_eq!(buffer.push(6.0), Some(5.0));
    assert_eq!(buffer.capacity(), 1);
  }
}
