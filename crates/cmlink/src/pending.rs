//! Single-use response slots.
//!
//! A request registers a slot before it sends, then waits on it. The read
//! loop hands a matching packet to the slot without blocking and removes
//! it. Slots are keyed either by job id (service methods) or by the EMsg
//! of the expected reply (logon, add-friend, ignore-friend); tag slots for
//! the same EMsg are served oldest first.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use cmlink_protocol::{EMsg, NO_JOB, Packet};
use tokio::sync::{oneshot, watch};

use crate::WaitError;
use crate::session::{Session, wait_closed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKey {
    Job(u64),
    Tag { emsg: EMsg, id: u64 },
}

/// Every live slot, guarded by the session's state lock.
#[derive(Default)]
pub(crate) struct PendingRegistry {
    jobs: HashMap<u64, oneshot::Sender<Packet>>,
    tags: HashMap<EMsg, VecDeque<(u64, oneshot::Sender<Packet>)>>,
}

impl PendingRegistry {
    pub(crate) fn insert(&mut self, key: SlotKey, tx: oneshot::Sender<Packet>) {
        match key {
            SlotKey::Job(job_id) => {
                self.jobs.insert(job_id, tx);
            }
            SlotKey::Tag { emsg, id } => self.tags.entry(emsg).or_default().push_back((id, tx)),
        }
    }

    pub(crate) fn remove(&mut self, key: SlotKey) {
        match key {
            SlotKey::Job(job_id) => {
                self.jobs.remove(&job_id);
            }
            SlotKey::Tag { emsg, id } => {
                if let Some(queue) = self.tags.get_mut(&emsg) {
                    queue.retain(|(slot_id, _)| *slot_id != id);
                    if queue.is_empty() {
                        self.tags.remove(&emsg);
                    }
                }
            }
        }
    }

    /// Hands `packet` to the job named by its target job id and to the
    /// oldest waiter on its EMsg. Returns how many waiters took it.
    pub(crate) fn deliver(&mut self, packet: &Packet) -> usize {
        let mut delivered = 0;

        let target = packet.header.target_job();
        if target != NO_JOB {
            if let Some(tx) = self.jobs.remove(&target) {
                if tx.send(packet.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        if let Some(queue) = self.tags.get_mut(&packet.emsg) {
            while let Some((_, tx)) = queue.pop_front() {
                if tx.send(packet.clone()).is_ok() {
                    delivered += 1;
                    break;
                }
            }
            if queue.is_empty() {
                self.tags.remove(&packet.emsg);
            }
        }

        delivered
    }

    /// Drops every slot; their waiters see the connection as gone.
    pub(crate) fn clear(&mut self) {
        self.jobs.clear();
        self.tags.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.jobs.len() + self.tags.values().map(VecDeque::len).sum::<usize>()
    }
}

/// A registered slot. Dropping it deregisters, whatever the outcome.
pub(crate) struct PendingSlot<'a> {
    pub(crate) session: &'a Session,
    pub(crate) key: SlotKey,
    pub(crate) rx: oneshot::Receiver<Packet>,
    pub(crate) done: watch::Receiver<bool>,
}

impl PendingSlot<'_> {
    /// Waits for the response, the connection's done signal, or the
    /// timeout, whichever comes first.
    pub(crate) async fn wait(mut self, timeout: Duration) -> Result<Packet, WaitError> {
        tokio::select! {
            biased;
            response = &mut self.rx => response.map_err(|_| WaitError::Disconnected),
            () = wait_closed(&mut self.done) => Err(WaitError::Disconnected),
            _ = tokio::time::sleep(timeout) => Err(WaitError::Timeout),
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.session.state().pending.remove(self.key);
    }
}

#[cfg(test)]
mod tests {
    use cmlink_protocol::PacketHeader;

    use super::*;

    fn reply(emsg: EMsg, target_job: Option<u64>) -> Packet {
        let header = PacketHeader {
            jobid_target: target_job,
            ..PacketHeader::default()
        };
        Packet::proto(emsg, header, vec![])
    }

    #[test]
    fn test_job_delivery_removes_slot() {
        let mut registry = PendingRegistry::default();
        let (tx, mut rx) = oneshot::channel();
        registry.insert(SlotKey::Job(42), tx);

        let delivered = registry.deliver(&reply(EMsg::ServiceMethodResponse, Some(42)));
        assert_eq!(delivered, 1);
        assert_eq!(registry.len(), 0);
        assert_eq!(rx.try_recv().unwrap().header.target_job(), 42);
    }

    #[test]
    fn test_unmatched_job_is_ignored() {
        let mut registry = PendingRegistry::default();
        let (tx, mut rx) = oneshot::channel();
        registry.insert(SlotKey::Job(42), tx);

        assert_eq!(registry.deliver(&reply(EMsg::ServiceMethodResponse, Some(99))), 0);
        assert_eq!(registry.deliver(&reply(EMsg::ServiceMethodResponse, None)), 0);
        assert_eq!(registry.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tag_waiters_served_oldest_first() {
        let mut registry = PendingRegistry::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        registry.insert(SlotKey::Tag { emsg: EMsg::ClientAddFriendResponse, id: 1 }, tx1);
        registry.insert(SlotKey::Tag { emsg: EMsg::ClientAddFriendResponse, id: 2 }, tx2);

        registry.deliver(&reply(EMsg::ClientAddFriendResponse, None));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert_eq!(registry.len(), 1);

        registry.deliver(&reply(EMsg::ClientAddFriendResponse, None));
        assert!(rx2.try_recv().is_ok());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_abandoned_tag_waiter_is_skipped() {
        let mut registry = PendingRegistry::default();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        registry.insert(SlotKey::Tag { emsg: EMsg::ClientLogOnResponse, id: 1 }, tx1);
        registry.insert(SlotKey::Tag { emsg: EMsg::ClientLogOnResponse, id: 2 }, tx2);
        drop(rx1);

        assert_eq!(registry.deliver(&reply(EMsg::ClientLogOnResponse, None)), 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_remove_specific_tag_slot() {
        let mut registry = PendingRegistry::default();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        registry.insert(SlotKey::Tag { emsg: EMsg::ClientLogOnResponse, id: 1 }, tx1);
        registry.insert(SlotKey::Tag { emsg: EMsg::ClientLogOnResponse, id: 2 }, tx2);

        registry.remove(SlotKey::Tag { emsg: EMsg::ClientLogOnResponse, id: 1 });
        assert_eq!(registry.len(), 1);
        registry.remove(SlotKey::Tag { emsg: EMsg::ClientLogOnResponse, id: 2 });
        assert_eq!(registry.len(), 0);
    }
}
