use common::PendingRequest;

/// Pending `(agentId, taskId)` pairs in insertion order. No deduplication.
#[derive(Debug, Default)]
pub struct RequestQueue {
    items: Vec<PendingRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PendingRequest) {
        self.items.push(request);
    }

    pub fn items(&self) -> &[PendingRequest] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes the entries at `indices` (ascending) and returns them in order.
    pub fn take_indices(&mut self, indices: &[usize]) -> Vec<PendingRequest> {
        let mut taken = Vec::with_capacity(indices.len());
        for &idx in indices.iter().rev() {
            if idx < self.items.len() {
                taken.push(self.items.remove(idx));
            }
        }
        taken.reverse();
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_coexist_in_order() {
        let mut q = RequestQueue::new();
        q.push(PendingRequest::new("a1", "t1"));
        q.push(PendingRequest::new("a1", "t1"));
        q.push(PendingRequest::new("a2", "t2"));
        assert_eq!(q.len(), 3);
        assert_eq!(q.items()[2].task_id, "t2");
    }

    #[test]
    fn take_indices_preserves_the_rest() {
        let mut q = RequestQueue::new();
        for i in 0..4 {
            q.push(PendingRequest::new("a", format!("t{i}")));
        }
        let taken = q.take_indices(&[0, 2]);
        assert_eq!(taken.iter().map(|r| r.task_id.as_str()).collect::<Vec<_>>(), vec!["t0", "t2"]);
        assert_eq!(q.items().iter().map(|r| r.task_id.as_str()).collect::<Vec<_>>(), vec!["t1", "t3"]);
    }
}
