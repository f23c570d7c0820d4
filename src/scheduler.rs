//! 송신 스케줄러
//!
//! - 피어별 FIFO 태스크 큐
//! - 여러 idle 채널로 head 태스크의 프래그먼트를 동시에 전송 (멀티플렉싱)
//! - END / CANCEL 마커는 배리어: 다른 쓰기가 모두 응답된 뒤 단독으로 전송
//! - head 태스크가 END 응답까지 받아야 다음 태스크 시작

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec::Frame;
use crate::pool::ChannelPool;
use crate::stats::SendStats;
use crate::task::{Completion, SendTask, TaskId};
use crate::transport::WriteAck;
use crate::{ChannelId, Error, PeerId, Result};

/// 채널이 운반 중인 쓰기
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Carried {
    Data(TaskId),
    End(TaskId),
    Cancel,
    /// 타임아웃 이후에도 응답이 오지 않은 쓰기 (채널은 계속 busy)
    Stale,
}

impl Carried {
    fn task_id(&self) -> Option<TaskId> {
        match self {
            Carried::Data(id) | Carried::End(id) => Some(*id),
            Carried::Cancel | Carried::Stale => None,
        }
    }

    fn is_marker(&self) -> bool {
        matches!(self, Carried::End(_) | Carried::Cancel)
    }
}

/// 응답 대기 중인 쓰기
#[derive(Debug, Clone, Copy)]
struct InFlight {
    carried: Carried,
    issued_at: Instant,
    size: usize,
}

/// 프레임 쓰기 요청 (writer 콜백 인자)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameWrite {
    pub channel: ChannelId,
    pub destination: Option<PeerId>,
    pub frame: Frame,
}

/// 쓰기 응답 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckReport {
    /// 응답된 쓰기의 프레임 크기 (대상 없는 응답이면 None)
    pub size: Option<usize>,

    /// 발행부터 응답까지 걸린 시간
    pub latency: Option<Duration>,
}

/// 송신 스케줄러
#[derive(Debug)]
pub struct SendScheduler {
    /// 대기 태스크 (head가 활성 태스크)
    queue: VecDeque<SendTask>,

    /// 다음 태스크 ID
    next_task_id: TaskId,

    /// 채널별 응답 대기 쓰기
    in_flight: HashMap<ChannelId, InFlight>,

    /// 다음 기회에 CANCEL 전송 필요
    cancel_pending: bool,

    /// 송신 카운터
    stats: SendStats,
}

impl Default for SendScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SendScheduler {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            next_task_id: 1,
            in_flight: HashMap::new(),
            cancel_pending: false,
            stats: SendStats::default(),
        }
    }

    /// 태스크 큐에 추가
    ///
    /// 풀이 비어 있으면 큐에 넣지 않고 완료 콜백을 즉시 `NoChannelsAvailable`로 호출
    pub fn enqueue(
        &mut self,
        pool: &ChannelPool,
        payload: Bytes,
        max_fragment_size: usize,
        destination: Option<PeerId>,
        completion: Option<Completion>,
    ) -> Result<TaskId> {
        let id = self.next_task_id;
        self.next_task_id += 1;

        if pool.is_empty() {
            if let Some(completion) = completion {
                completion(id, Err(Error::NoChannelsAvailable));
            }
            return Err(Error::NoChannelsAvailable);
        }

        if max_fragment_size == 0 {
            let error = Error::InvalidConfig("max_fragment_size는 0일 수 없음".into());
            if let Some(completion) = completion {
                completion(id, Err(error.clone()));
            }
            return Err(error);
        }

        let task = match destination {
            Some(central) => {
                SendTask::for_central(id, payload, max_fragment_size, central, completion)
            }
            None => SendTask::new(id, payload, max_fragment_size, completion),
        };

        debug!(
            "태스크 {} 추가: {} bytes, {} 프래그먼트, 대기 {}",
            id,
            task.len(),
            task.fragment_count(),
            self.queue.len()
        );
        self.queue.push_back(task);
        Ok(id)
    }

    /// idle 채널이 남아 있는 동안 head 태스크의 프레임을 전송
    ///
    /// 발행한 쓰기 수 반환
    pub fn dispatch<W>(&mut self, pool: &mut ChannelPool, write: &mut W) -> usize
    where
        W: FnMut(FrameWrite) -> Result<()>,
    {
        let mut writes = 0;

        loop {
            // 마커 응답 대기 중이면 아무것도 보내지 않음
            if self.marker_in_flight() {
                break;
            }

            if self.cancel_pending {
                if self.live_in_flight() > 0 {
                    break;
                }
                let Some(channel) = pool.first_idle() else {
                    break;
                };

                self.cancel_pending = false;
                match self.issue(pool, channel, Carried::Cancel, None, Frame::Cancel, write) {
                    Ok(()) => writes += 1,
                    Err(e) => warn!("CANCEL 전송 실패: channel={}, {}", channel, e),
                }
                continue;
            }

            let Some((task_id, destination)) =
                self.queue.front().map(|t| (t.id(), t.destination()))
            else {
                break;
            };

            // 실패한 이전 태스크의 쓰기가 남아 있으면 대기
            if self.in_flight_for_other(task_id) {
                break;
            }
            let Some(channel) = pool.first_idle() else {
                break;
            };
            let Some(head) = self.queue.front_mut() else {
                break;
            };

            if !head.is_complete() {
                let frame = match head.take_data_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        self.fail_head(e);
                        continue;
                    }
                };

                match self.issue(pool, channel, Carried::Data(task_id), destination, frame, write) {
                    Ok(()) => writes += 1,
                    Err(e) => self.fail_head(e),
                }
                continue;
            }

            if head.in_flight() == 0 && !head.end_sent() {
                let frame = head.take_end_frame();
                match self.issue(pool, channel, Carried::End(task_id), destination, frame, write) {
                    Ok(()) => writes += 1,
                    Err(e) => self.fail_head(e),
                }
                continue;
            }

            // DATA 응답 또는 END 응답 대기
            break;
        }

        writes
    }

    fn issue<W>(
        &mut self,
        pool: &mut ChannelPool,
        channel: ChannelId,
        carried: Carried,
        destination: Option<PeerId>,
        frame: Frame,
        write: &mut W,
    ) -> Result<()>
    where
        W: FnMut(FrameWrite) -> Result<()>,
    {
        pool.mark_busy(channel)?;

        let size = frame.wire_len();
        let payload_len = match &frame {
            Frame::Data { payload, .. } => Some(payload.len()),
            _ => None,
        };

        if let Err(e) = write(FrameWrite {
            channel,
            destination,
            frame,
        }) {
            self.stats.write_errors += 1;
            let _ = pool.mark_idle(channel);
            return Err(e);
        }

        match payload_len {
            Some(len) => {
                self.stats.fragments_sent += 1;
                self.stats.payload_bytes_sent += len as u64;
            }
            None => self.stats.markers_sent += 1,
        }

        self.in_flight.insert(
            channel,
            InFlight {
                carried,
                issued_at: Instant::now(),
                size,
            },
        );
        Ok(())
    }

    /// 쓰기 응답 처리
    ///
    /// 채널을 idle로 되돌리고 태스크 상태 갱신. 이후 `dispatch` 재호출 필요.
    /// 풀에 없는 채널이면 `UnknownChannel` (상태는 그대로 처리됨)
    pub fn on_write_complete(
        &mut self,
        pool: &mut ChannelPool,
        channel: ChannelId,
        ack: WriteAck,
    ) -> Result<AckReport> {
        let entry = self.in_flight.remove(&channel);
        let report = AckReport {
            size: entry.map(|e| e.size),
            latency: entry.map(|e| e.issued_at.elapsed()),
        };

        match entry {
            None => debug!("대기 중인 쓰기 없는 채널 응답: {}", channel),
            Some(entry) => self.apply_ack(channel, entry.carried, ack),
        }

        pool.mark_idle(channel)?;
        Ok(report)
    }

    fn apply_ack(&mut self, channel: ChannelId, carried: Carried, ack: WriteAck) {
        let head_id = self.head_id();

        match (carried, ack) {
            (Carried::Data(id), Ok(())) if head_id == Some(id) => {
                if let Some(head) = self.queue.front_mut() {
                    head.ack_data();
                }
            }
            (Carried::End(id), Ok(())) if head_id == Some(id) => {
                if let Some(task) = self.queue.pop_front() {
                    debug!(
                        "태스크 {} 완료: {} bytes, {:.2}ms",
                        id,
                        task.len(),
                        task.created_at().elapsed().as_secs_f64() * 1000.0
                    );
                    self.stats.tasks_completed += 1;
                    task.complete(Ok(()));
                }
            }
            (Carried::Data(id) | Carried::End(id), Err(reason)) if head_id == Some(id) => {
                self.stats.write_errors += 1;
                warn!("쓰기 실패: task={}, channel={}, {}", id, channel, reason);
                self.fail_head(Error::TransportWrite { channel, reason });
            }
            (Carried::Cancel, Err(reason)) => {
                self.stats.write_errors += 1;
                warn!("CANCEL 쓰기 실패: channel={}, {}", channel, reason);
            }
            (Carried::Stale, _) => {
                debug!("타임아웃된 쓰기 응답 도착: channel={}", channel);
            }
            _ => {
                // 이미 실패/취소된 태스크의 응답
            }
        }
    }

    /// 태스크 취소
    ///
    /// 진행 중이던 태스크면 CANCEL 마커 전송 예약. END까지 보낸 태스크는 취소 불가.
    pub fn cancel(&mut self, task_id: TaskId) -> bool {
        let Some(pos) = self.queue.iter().position(|t| t.id() == task_id) else {
            return false;
        };
        if self.queue[pos].end_sent() {
            return false;
        }
        let Some(task) = self.queue.remove(pos) else {
            return false;
        };

        if pos == 0 && task.is_started() {
            self.cancel_pending = true;
        }

        debug!("태스크 {} 취소 ({} / {} bytes 전송됨)", task_id, task.offset(), task.len());
        self.stats.tasks_cancelled += 1;
        task.complete(Err(Error::Cancelled { task_id }));
        true
    }

    /// 채널 해제 처리 (풀에서 이미 제거된 뒤 호출)
    pub fn on_channel_removed(&mut self, channel: ChannelId) {
        let Some(entry) = self.in_flight.remove(&channel) else {
            return;
        };

        match entry.carried {
            Carried::Cancel => self.cancel_pending = true,
            carried => {
                if carried.task_id().is_some() && carried.task_id() == self.head_id() {
                    warn!("전송 중 채널 해제: channel={}", channel);
                    self.fail_head(Error::TransportWrite {
                        channel,
                        reason: "채널 해제됨".into(),
                    });
                }
            }
        }
    }

    /// 타임아웃된 쓰기 처리, 타임아웃 수 반환
    ///
    /// 해당 채널은 늦은 응답이 올 때까지 busy로 유지
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let expired: Vec<ChannelId> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.carried != Carried::Stale)
            .filter(|(_, f)| now.saturating_duration_since(f.issued_at) >= timeout)
            .map(|(&channel, _)| channel)
            .collect();

        for &channel in &expired {
            let Some(entry) = self.in_flight.get_mut(&channel) else {
                continue;
            };
            let carried = std::mem::replace(&mut entry.carried, Carried::Stale);
            self.stats.write_timeouts += 1;

            match carried {
                Carried::Cancel => {
                    warn!("CANCEL 응답 타임아웃: channel={}", channel);
                    self.cancel_pending = true;
                }
                carried if carried.task_id().is_some() && carried.task_id() == self.head_id() => {
                    warn!(
                        "쓰기 응답 타임아웃: channel={}, {}ms",
                        channel,
                        timeout.as_millis()
                    );
                    self.fail_head(Error::WriteTimeout {
                        channel,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                _ => {}
            }
        }

        expired.len()
    }

    /// 연결 끊김: 모든 태스크를 `Interrupted`로 실패 처리, 중단된 수 반환
    pub fn interrupt(&mut self) -> usize {
        let count = self.queue.len();
        self.in_flight.clear();
        self.cancel_pending = false;

        for task in self.queue.drain(..) {
            task.complete(Err(Error::Interrupted));
        }
        self.stats.tasks_interrupted += count as u64;

        if count > 0 {
            warn!("연결 끊김으로 태스크 {}개 중단", count);
        }
        count
    }

    fn fail_head(&mut self, error: Error) {
        if let Some(task) = self.queue.pop_front() {
            if task.is_started() {
                self.cancel_pending = true;
            }
            self.stats.tasks_failed += 1;
            task.complete(Err(error));
        }
    }

    fn marker_in_flight(&self) -> bool {
        self.in_flight.values().any(|f| f.carried.is_marker())
    }

    fn live_in_flight(&self) -> usize {
        self.in_flight
            .values()
            .filter(|f| f.carried != Carried::Stale)
            .count()
    }

    fn in_flight_for_other(&self, task_id: TaskId) -> bool {
        self.in_flight
            .values()
            .any(|f| matches!(f.carried.task_id(), Some(id) if id != task_id))
    }

    /// 활성 태스크 ID
    pub fn head_id(&self) -> Option<TaskId> {
        self.queue.front().map(|t| t.id())
    }

    /// 활성 태스크
    pub fn head(&self) -> Option<&SendTask> {
        self.queue.front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// 응답 대기 중인 쓰기 수 (타임아웃된 쓰기 포함)
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_cancel_pending(&self) -> bool {
        self.cancel_pending
    }

    pub fn stats(&self) -> &SendStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::{Arc, Mutex};

    type Results = Arc<Mutex<Vec<(TaskId, Result<()>)>>>;

    fn pool_with(channels: &[ChannelId]) -> ChannelPool {
        let mut pool = ChannelPool::new();
        for &c in channels {
            pool.register(c);
        }
        pool
    }

    fn recorder(results: &Results) -> Option<Completion> {
        let results = results.clone();
        Some(Box::new(move |id, result| {
            results.lock().unwrap().push((id, result));
        }))
    }

    /// 쓰기를 기록하는 writer
    fn wire(writes: &RefCell<Vec<FrameWrite>>) -> impl FnMut(FrameWrite) -> Result<()> + '_ {
        move |w| {
            writes.borrow_mut().push(w);
            Ok(())
        }
    }

    fn data(write: &FrameWrite) -> &[u8] {
        match &write.frame {
            Frame::Data { payload, .. } => &payload[..],
            other => panic!("DATA 프레임 아님: {:?}", other),
        }
    }

    #[test]
    fn test_helloworld_single_channel() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        let id = scheduler
            .enqueue(&pool, Bytes::from_static(b"HELLOWORLD"), 4, None, recorder(&results))
            .unwrap();

        // idle 이벤트마다 정확히 한 프래그먼트
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 1);
        for _ in 0..3 {
            assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 0);
            scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
            assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 1);
        }
        assert!(results.lock().unwrap().is_empty());

        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 0);

        let writes = writes.borrow();
        assert_eq!(writes.len(), 4);
        assert_eq!(data(&writes[0]), b"HELL");
        assert_eq!(data(&writes[1]), b"OWOR");
        assert_eq!(data(&writes[2]), b"LD");
        assert_eq!(
            writes[3].frame,
            Frame::End {
                count: 3,
                crc32: crc32fast::hash(b"HELLOWORLD")
            }
        );
        assert_eq!(results.lock().unwrap().as_slice(), &[(id, Ok(()))]);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.stats().tasks_completed, 1);
        assert_eq!(scheduler.stats().fragments_sent, 3);
    }

    #[test]
    fn test_multiplexing_fills_idle_channels() {
        let mut pool = pool_with(&[1, 2, 3]);
        let mut scheduler = SendScheduler::new();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        let id = scheduler
            .enqueue(&pool, Bytes::from(vec![0xAB; 40]), 4, None, None)
            .unwrap();
        scheduler
            .enqueue(&pool, Bytes::from_static(b"next"), 4, None, None)
            .unwrap();

        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 3);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(scheduler.head_id(), Some(id));
        assert_eq!(scheduler.head().map(|t| t.offset()), Some(12));

        let writes = writes.borrow();
        let channels: Vec<ChannelId> = writes.iter().map(|w| w.channel).collect();
        assert_eq!(channels, vec![1, 2, 3]);
        assert!(writes
            .iter()
            .all(|w| matches!(w.frame, Frame::Data { .. })));
    }

    #[test]
    fn test_end_waits_for_all_data_acks() {
        let mut pool = pool_with(&[1, 2]);
        let mut scheduler = SendScheduler::new();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        scheduler
            .enqueue(&pool, Bytes::from_static(b"abcdefgh"), 4, None, None)
            .unwrap();
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 2);

        // 남은 데이터는 없지만 다른 DATA 응답 대기
        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 0);

        scheduler.on_write_complete(&mut pool, 2, Ok(())).unwrap();
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 1);
        assert!(matches!(writes.borrow()[2].frame, Frame::End { count: 2, .. }));
        assert_eq!(writes.borrow()[2].channel, 1);
        // END 응답 전에는 다른 채널도 사용하지 않음
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 0);
    }

    #[test]
    fn test_empty_pool_fails_synchronously() {
        let pool = ChannelPool::new();
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();

        let result =
            scheduler.enqueue(&pool, Bytes::from_static(b"x"), 4, None, recorder(&results));

        assert_eq!(result, Err(Error::NoChannelsAvailable));
        assert_eq!(scheduler.len(), 0);
        assert_eq!(
            results.lock().unwrap().as_slice(),
            &[(1, Err(Error::NoChannelsAvailable))]
        );
    }

    #[test]
    fn test_empty_payload_sends_single_end() {
        let mut pool = pool_with(&[1, 2]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        scheduler
            .enqueue(&pool, Bytes::new(), 4, None, recorder(&results))
            .unwrap();
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 1);
        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();

        assert_eq!(writes.borrow().len(), 1);
        assert!(matches!(writes.borrow()[0].frame, Frame::End { count: 0, .. }));
        assert_eq!(results.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_back_to_back_payloads_wait_for_end_ack() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        scheduler
            .enqueue(&pool, Bytes::from_static(b"first"), 8, None, None)
            .unwrap();
        scheduler
            .enqueue(&pool, Bytes::from_static(b"second"), 8, None, None)
            .unwrap();

        scheduler.dispatch(&mut pool, &mut writer);
        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
        scheduler.dispatch(&mut pool, &mut writer);
        assert!(matches!(
            writes.borrow().last().map(|w| &w.frame),
            Some(Frame::End { .. })
        ));

        // END 응답 전: 두 번째 payload 시작 안 함
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 0);
        assert_eq!(writes.borrow().len(), 2);

        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 1);
        assert_eq!(data(&writes.borrow()[2]), b"second");
    }

    #[test]
    fn test_disconnect_interrupts_all() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let mut writer = |_: FrameWrite| -> Result<()> { Ok(()) };

        scheduler
            .enqueue(&pool, Bytes::from_static(b"one"), 2, None, recorder(&results))
            .unwrap();
        scheduler
            .enqueue(&pool, Bytes::from_static(b"two"), 2, None, recorder(&results))
            .unwrap();
        scheduler.dispatch(&mut pool, &mut writer);

        assert_eq!(scheduler.interrupt(), 2);
        assert_eq!(scheduler.len(), 0);
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(
            results.lock().unwrap().as_slice(),
            &[(1, Err(Error::Interrupted)), (2, Err(Error::Interrupted))]
        );
        assert_eq!(scheduler.stats().tasks_interrupted, 2);
    }

    #[test]
    fn test_write_failure_sends_cancel_then_next_task() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        scheduler
            .enqueue(&pool, Bytes::from_static(b"abcdef"), 4, None, recorder(&results))
            .unwrap();
        scheduler
            .enqueue(&pool, Bytes::from_static(b"gh"), 4, None, recorder(&results))
            .unwrap();

        scheduler.dispatch(&mut pool, &mut writer);
        scheduler
            .on_write_complete(&mut pool, 1, Err("GATT error 0x0E".into()))
            .unwrap();

        assert_eq!(
            results.lock().unwrap().as_slice(),
            &[(
                1,
                Err(Error::TransportWrite {
                    channel: 1,
                    reason: "GATT error 0x0E".into()
                })
            )]
        );
        assert!(scheduler.is_cancel_pending());

        scheduler.dispatch(&mut pool, &mut writer);
        assert_eq!(writes.borrow()[1].frame, Frame::Cancel);

        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
        scheduler.dispatch(&mut pool, &mut writer);
        assert_eq!(data(&writes.borrow()[2]), b"gh");
        assert_eq!(scheduler.stats().tasks_failed, 1);
    }

    #[test]
    fn test_synchronous_write_error_fails_task() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let mut writer = |w: FrameWrite| -> Result<()> {
            Err(Error::TransportWrite {
                channel: w.channel,
                reason: "not connected".into(),
            })
        };

        scheduler
            .enqueue(&pool, Bytes::from_static(b"abc"), 4, None, recorder(&results))
            .unwrap();
        assert_eq!(scheduler.dispatch(&mut pool, &mut writer), 0);

        assert!(scheduler.is_empty());
        assert_eq!(pool.idle_count(), 1);
        assert!(matches!(
            results.lock().unwrap()[0],
            (1, Err(Error::TransportWrite { channel: 1, .. }))
        ));
    }

    #[test]
    fn test_cancel_queued_and_active() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        let active = scheduler
            .enqueue(&pool, Bytes::from_static(b"abcdef"), 4, None, recorder(&results))
            .unwrap();
        let queued = scheduler
            .enqueue(&pool, Bytes::from_static(b"xyz"), 4, None, recorder(&results))
            .unwrap();
        scheduler.dispatch(&mut pool, &mut writer);

        // 시작 안 한 태스크: 마커 없이 제거
        assert!(scheduler.cancel(queued));
        assert!(!scheduler.is_cancel_pending());

        assert!(scheduler.cancel(active));
        assert!(scheduler.is_cancel_pending());
        assert!(!scheduler.cancel(active));

        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
        scheduler.dispatch(&mut pool, &mut writer);
        assert_eq!(
            writes.borrow().last().map(|w| w.frame.clone()),
            Some(Frame::Cancel)
        );

        assert_eq!(
            results.lock().unwrap().as_slice(),
            &[
                (queued, Err(Error::Cancelled { task_id: queued })),
                (active, Err(Error::Cancelled { task_id: active })),
            ]
        );
        assert_eq!(scheduler.stats().tasks_cancelled, 2);
    }

    #[test]
    fn test_write_timeout() {
        let mut pool = pool_with(&[1, 2]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        scheduler
            .enqueue(&pool, Bytes::from_static(b"abcd"), 4, None, recorder(&results))
            .unwrap();
        scheduler.dispatch(&mut pool, &mut writer);

        let timeout = Duration::from_millis(100);
        assert_eq!(scheduler.expire(Instant::now(), timeout), 0);
        assert_eq!(scheduler.expire(Instant::now() + timeout, timeout), 1);

        assert_eq!(
            results.lock().unwrap().as_slice(),
            &[(
                1,
                Err(Error::WriteTimeout {
                    channel: 1,
                    timeout_ms: 100
                })
            )]
        );
        // 멈춘 채널은 busy 유지, CANCEL은 다른 채널로
        assert_eq!(pool.is_idle(1), Some(false));
        scheduler.dispatch(&mut pool, &mut writer);
        assert_eq!(writes.borrow()[1].channel, 2);
        assert_eq!(writes.borrow()[1].frame, Frame::Cancel);

        // 늦은 응답은 채널만 해제
        scheduler.on_write_complete(&mut pool, 1, Ok(())).unwrap();
        assert_eq!(pool.is_idle(1), Some(true));
        assert_eq!(scheduler.stats().write_timeouts, 1);
    }

    #[test]
    fn test_channel_removed_mid_transfer() {
        let mut pool = pool_with(&[1, 2]);
        let mut scheduler = SendScheduler::new();
        let results: Results = Default::default();
        let mut writer = |_: FrameWrite| -> Result<()> { Ok(()) };

        scheduler
            .enqueue(&pool, Bytes::from(vec![1u8; 20]), 4, None, recorder(&results))
            .unwrap();
        scheduler.dispatch(&mut pool, &mut writer);

        assert_eq!(pool.unregister(2), Ok(true));
        scheduler.on_channel_removed(2);

        assert!(scheduler.is_empty());
        assert!(matches!(
            results.lock().unwrap()[0],
            (1, Err(Error::TransportWrite { channel: 2, .. }))
        ));
    }

    #[test]
    fn test_ack_on_unknown_channel_is_not_fatal() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();

        assert_eq!(
            scheduler.on_write_complete(&mut pool, 9, Ok(())),
            Err(Error::UnknownChannel { channel: 9 })
        );
        assert_eq!(pool.idle_channels(), vec![1]);
    }

    #[test]
    fn test_central_destination_passed_to_writer() {
        let mut pool = pool_with(&[1]);
        let mut scheduler = SendScheduler::new();
        let writes = RefCell::new(Vec::new());
        let mut writer = wire(&writes);

        scheduler
            .enqueue(&pool, Bytes::from_static(b"hi"), 4, Some(77), None)
            .unwrap();
        scheduler.dispatch(&mut pool, &mut writer);
        assert_eq!(writes.borrow()[0].destination, Some(77));
    }
}
