//! Queue status transitions
//!
//! A room has two single-occupancy slots: the request that is `next` and the
//! one that is `ongoing`. Moving a request into a slot pushes out whoever held
//! it: a displaced `next` goes back to `pending`, a displaced `ongoing` is
//! `completed`. Any other change of status is applied as asked.

use crate::models::{RequestStatus, SongRequest};

/// Set `request_id` to `status`, evicting the previous holder of its slot
///
/// Returns `false` without touching the queue when the request is not in it.
pub fn apply_status_change(
    queue: &mut [SongRequest],
    request_id: &str,
    status: RequestStatus,
) -> bool {
    if !queue.iter().any(|r| r.id == request_id) {
        return false;
    }

    for request in queue.iter_mut() {
        if request.id == request_id {
            request.status = status;
        } else if request.status == status {
            match status {
                RequestStatus::Next => request.status = RequestStatus::Pending,
                RequestStatus::Ongoing => request.status = RequestStatus::Completed,
                RequestStatus::Pending | RequestStatus::Completed => {}
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn queue_of(statuses: &[RequestStatus]) -> Vec<SongRequest> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| SongRequest {
                id: format!("r{}", i),
                guest_name: format!("Guest {}", i),
                song_name: format!("Song {}", i),
                youtube_link: None,
                status: *status,
                submitted_at: Utc::now(),
            })
            .collect()
    }

    fn statuses(queue: &[SongRequest]) -> Vec<RequestStatus> {
        queue.iter().map(|r| r.status).collect()
    }

    use RequestStatus::*;

    #[test]
    fn test_next_demotes_previous_next() {
        let mut queue = queue_of(&[Next, Pending, Pending]);
        assert!(apply_status_change(&mut queue, "r2", Next));
        assert_eq!(statuses(&queue), vec![Pending, Pending, Next]);
    }

    #[test]
    fn test_ongoing_completes_previous_ongoing() {
        let mut queue = queue_of(&[Completed, Ongoing, Pending, Next]);
        assert!(apply_status_change(&mut queue, "r2", Ongoing));
        assert_eq!(statuses(&queue), vec![Completed, Completed, Ongoing, Next]);
    }

    #[test]
    fn test_next_and_ongoing_are_independent_slots() {
        let mut queue = queue_of(&[Next, Pending]);
        assert!(apply_status_change(&mut queue, "r1", Ongoing));
        assert_eq!(statuses(&queue), vec![Next, Ongoing]);
    }

    #[test]
    fn test_promoting_next_to_ongoing_frees_next_slot() {
        let mut queue = queue_of(&[Ongoing, Next, Pending]);
        assert!(apply_status_change(&mut queue, "r1", Ongoing));
        assert_eq!(statuses(&queue), vec![Completed, Ongoing, Pending]);
    }

    #[test]
    fn test_any_transition_is_accepted() {
        let mut queue = queue_of(&[Completed]);
        assert!(apply_status_change(&mut queue, "r0", Pending));
        assert_eq!(statuses(&queue), vec![Pending]);
    }

    #[test]
    fn test_setting_same_status_is_stable() {
        let mut queue = queue_of(&[Next, Pending]);
        assert!(apply_status_change(&mut queue, "r0", Next));
        assert_eq!(statuses(&queue), vec![Next, Pending]);
    }

    #[test]
    fn test_unknown_request_is_noop() {
        let mut queue = queue_of(&[Next, Ongoing]);
        assert!(!apply_status_change(&mut queue, "missing", Ongoing));
        assert_eq!(statuses(&queue), vec![Next, Ongoing]);
    }

    fn status_strategy() -> impl Strategy<Value = RequestStatus> {
        prop_oneof![Just(Pending), Just(Next), Just(Ongoing), Just(Completed)]
    }

    proptest! {
        #[test]
        fn prop_slots_hold_at_most_one(
            len in 1usize..8,
            ops in prop::collection::vec((0usize..8, status_strategy()), 0..40),
        ) {
            let mut queue = queue_of(&vec![Pending; len]);

            for (index, status) in ops {
                let id = format!("r{}", index);
                let before = queue.clone();
                let applied = apply_status_change(&mut queue, &id, status);

                prop_assert_eq!(applied, index < len);
                prop_assert!(queue.iter().filter(|r| r.status == Next).count() <= 1);
                prop_assert!(queue.iter().filter(|r| r.status == Ongoing).count() <= 1);

                // Only the target and the evicted slot holder may change
                let changed: Vec<_> = before
                    .iter()
                    .zip(queue.iter())
                    .filter(|(b, a)| b.status != a.status && a.id != id)
                    .collect();
                prop_assert!(changed.len() <= 1);
                for (b, a) in changed {
                    prop_assert_eq!(b.status, status);
                    prop_assert!(a.status == Pending || a.status == Completed);
                }
            }
        }
    }
}
