//! 송신 태스크
//!
//! 하나의 outbound payload에 대한 커서.
//! 오프셋 추적, 다음 프래그먼트 생성, 완료 여부 보고.

use std::fmt;
use std::time::Instant;

use bytes::Bytes;

use crate::codec::{self, Frame};
use crate::{Error, PeerId, Result};

/// 태스크 ID (enqueue 시 단조 증가 할당)
pub type TaskId = u64;

/// 완료 콜백 (정확히 한 번 호출)
pub type Completion = Box<dyn FnOnce(TaskId, Result<()>) + Send + 'static>;

/// 송신 태스크
pub struct SendTask {
    /// 태스크 ID
    id: TaskId,

    /// 전송할 데이터
    payload: Bytes,

    /// 다음에 보낼 바이트 위치
    offset: usize,

    /// 프래그먼트 최대 크기
    max_fragment_size: usize,

    /// 목적지 (다중 central 전송 시)
    destination: Option<PeerId>,

    /// 완료 콜백
    completion: Option<Completion>,

    /// 다음 DATA 시퀀스
    next_seq: u16,

    /// 응답 대기 중인 DATA 쓰기 수
    in_flight: usize,

    /// END 전송 여부
    end_sent: bool,

    /// 생성 시간
    created_at: Instant,
}

impl SendTask {
    /// 단일 피어용 태스크 생성
    pub fn new(
        id: TaskId,
        payload: Bytes,
        max_fragment_size: usize,
        completion: Option<Completion>,
    ) -> Self {
        debug_assert!(max_fragment_size > 0);

        Self {
            id,
            payload,
            offset: 0,
            max_fragment_size: max_fragment_size.max(1),
            destination: None,
            completion,
            next_seq: 0,
            in_flight: 0,
            end_sent: false,
            created_at: Instant::now(),
        }
    }

    /// 여러 central 중 하나로 보내는 태스크 생성
    pub fn for_central(
        id: TaskId,
        payload: Bytes,
        max_fragment_size: usize,
        central: PeerId,
        completion: Option<Completion>,
    ) -> Self {
        let mut task = Self::new(id, payload, max_fragment_size, completion);
        task.destination = Some(central);
        task
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    pub fn max_fragment_size(&self) -> usize {
        self.max_fragment_size
    }

    pub fn destination(&self) -> Option<PeerId> {
        self.destination
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 총 프래그먼트 수
    pub fn fragment_count(&self) -> usize {
        codec::fragment_count(self.payload.len(), self.max_fragment_size)
    }

    /// 모든 데이터 전송 여부
    pub fn is_complete(&self) -> bool {
        self.offset == self.payload.len()
    }

    /// 다음 프래그먼트 (상태 변경 없음)
    pub fn next_fragment(&self) -> Bytes {
        codec::fragment_at(&self.payload, self.offset, self.max_fragment_size)
    }

    /// 오프셋 전진
    pub fn advance(&mut self, n: usize) -> Result<()> {
        let end = self.offset + n;
        if end > self.payload.len() {
            debug_assert!(false, "advance past payload end");
            return Err(Error::Range {
                offset: self.offset,
                advance: n,
                len: self.payload.len(),
            });
        }
        self.offset = end;
        Ok(())
    }

    /// 전송이 시작됐는지 (취소 시 CANCEL 마커 필요 여부)
    pub fn is_started(&self) -> bool {
        self.offset > 0 || self.in_flight > 0 || self.end_sent
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub(crate) fn end_sent(&self) -> bool {
        self.end_sent
    }

    /// 다음 DATA 프레임 생성 후 커서 전진
    pub(crate) fn take_data_frame(&mut self) -> Result<Frame> {
        let payload = self.next_fragment();
        self.advance(payload.len())?;

        let frame = Frame::Data {
            seq: self.next_seq,
            payload,
        };
        self.next_seq = self.next_seq.wrapping_add(1);
        self.in_flight += 1;
        Ok(frame)
    }

    /// DATA 쓰기 응답 수신
    pub(crate) fn ack_data(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// END 프레임 생성
    pub(crate) fn take_end_frame(&mut self) -> Frame {
        self.end_sent = true;
        Frame::End {
            count: self.next_seq,
            crc32: crc32fast::hash(&self.payload),
        }
    }

    /// 완료 콜백 호출 후 태스크 소멸
    pub fn complete(mut self, result: Result<()>) {
        if let Some(completion) = self.completion.take() {
            completion(self.id, result);
        }
    }
}

impl Drop for SendTask {
    fn drop(&mut self) {
        // 콜백 없이 버려지는 경우 대기자에게 중단 알림
        if let Some(completion) = self.completion.take() {
            completion(self.id, Err(Error::Interrupted));
        }
    }
}

impl PartialEq for SendTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SendTask {}

impl fmt::Debug for SendTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendTask")
            .field("id", &self.id)
            .field("len", &self.payload.len())
            .field("offset", &self.offset)
            .field("max_fragment_size", &self.max_fragment_size)
            .field("destination", &self.destination)
            .field("in_flight", &self.in_flight)
            .field("end_sent", &self.end_sent)
            .finish()
    }
}
