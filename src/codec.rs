//! 프래그먼트 코덱
//!
//! - Payload를 전송 크기의 Fragment로 분할
//! - 모든 쓰기는 종류 태그가 붙은 Frame 단위
//! - END / CANCEL 마커는 항상 단독 쓰기로 전송
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────────────────┐
//! │ kind(1B) │ seq(2B, LE)  │ body                      │
//! └──────────┴──────────────┴──────────────────────────┘
//! DATA    seq = 프래그먼트 인덱스     body = 데이터
//! END     seq = 프래그먼트 수         body = 전체 payload CRC32 (4B)
//! CANCEL  seq = 0                     body = 없음
//! ```
//!
//! 데이터 프레임은 항상 DATA 태그로 시작하므로 어떤 payload도 마커와 혼동되지 않음.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 프레임 헤더 크기 (kind + seq)
pub const FRAME_HEADER_SIZE: usize = 3;

/// END 프레임 body 크기 (CRC32)
pub const END_BODY_SIZE: usize = 4;

/// 데이터 프레임 태그
pub const DATA: u8 = 0x01;

/// 메시지 종료 마커
pub const END_OF_MESSAGE: u8 = 0x02;

/// 취소 마커
pub const CANCEL: u8 = 0x03;

/// 취소 프레임 (고정 바이트열)
pub const CANCEL_FRAME: [u8; FRAME_HEADER_SIZE] = [CANCEL, 0, 0];

/// 프레임 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// 데이터 조각
    Data = DATA,

    /// 메시지 종료
    End = END_OF_MESSAGE,

    /// 진행 중 메시지 취소
    Cancel = CANCEL,
}

impl FrameKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            DATA => Some(FrameKind::Data),
            END_OF_MESSAGE => Some(FrameKind::End),
            CANCEL => Some(FrameKind::Cancel),
            _ => None,
        }
    }
}

/// 한 번의 채널 쓰기 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { seq: u16, payload: Bytes },
    End { count: u16, crc32: u32 },
    Cancel,
}

impl Frame {
    /// 프레임 종류
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data { .. } => FrameKind::Data,
            Frame::End { .. } => FrameKind::End,
            Frame::Cancel => FrameKind::Cancel,
        }
    }

    /// END / CANCEL 여부
    pub fn is_marker(&self) -> bool {
        !matches!(self, Frame::Data { .. })
    }

    /// 인코딩된 길이
    pub fn wire_len(&self) -> usize {
        match self {
            Frame::Data { payload, .. } => FRAME_HEADER_SIZE + payload.len(),
            Frame::End { .. } => FRAME_HEADER_SIZE + END_BODY_SIZE,
            Frame::Cancel => FRAME_HEADER_SIZE,
        }
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        match self {
            Frame::Data { seq, payload } => {
                buf.put_u8(DATA);
                buf.put_u16_le(*seq);
                buf.put_slice(payload);
            }
            Frame::End { count, crc32 } => {
                buf.put_u8(END_OF_MESSAGE);
                buf.put_u16_le(*count);
                buf.put_u32_le(*crc32);
            }
            Frame::Cancel => buf.put_slice(&CANCEL_FRAME),
        }
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    ///
    /// DATA payload는 입력 버퍼를 복사 없이 잘라 사용
    pub fn decode(mut bytes: Bytes) -> Result<Self> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(Error::InvalidFrame("헤더 길이 부족"));
        }

        let kind = FrameKind::from_u8(bytes.get_u8())
            .ok_or(Error::InvalidFrame("알 수 없는 프레임 종류"))?;
        let seq = bytes.get_u16_le();

        match kind {
            FrameKind::Data => Ok(Frame::Data {
                seq,
                payload: bytes,
            }),
            FrameKind::End => {
                if bytes.len() != END_BODY_SIZE {
                    return Err(Error::InvalidFrame("END body 길이 불일치"));
                }
                Ok(Frame::End {
                    count: seq,
                    crc32: bytes.get_u32_le(),
                })
            }
            FrameKind::Cancel => {
                if !bytes.is_empty() {
                    return Err(Error::InvalidFrame("CANCEL 프레임에 body 존재"));
                }
                Ok(Frame::Cancel)
            }
        }
    }
}

/// 프래그먼트 수 계산 (빈 payload는 0, END만 전송)
pub fn fragment_count(len: usize, max_fragment_size: usize) -> usize {
    if max_fragment_size == 0 {
        return 0;
    }
    (len + max_fragment_size - 1) / max_fragment_size
}

/// `offset`부터 최대 `max_fragment_size` 바이트 조각 (복사 없음)
pub fn fragment_at(payload: &Bytes, offset: usize, max_fragment_size: usize) -> Bytes {
    let start = offset.min(payload.len());
    let end = start + max_fragment_size.min(payload.len() - start);
    payload.slice(start..end)
}

/// Payload를 순서대로 분할하는 이터레이터
pub fn split(payload: Bytes, max_fragment_size: usize) -> Fragments {
    Fragments {
        payload,
        offset: 0,
        max_fragment_size,
    }
}

/// `split` 결과
#[derive(Debug, Clone)]
pub struct Fragments {
    payload: Bytes,
    offset: usize,
    max_fragment_size: usize,
}

impl Iterator for Fragments {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.max_fragment_size == 0 || self.offset >= self.payload.len() {
            return None;
        }
        let fragment = fragment_at(&self.payload, self.offset, self.max_fragment_size);
        self.offset += fragment.len();
        Some(fragment)
    }
}

/// 메시지 전체를 프레임 목록으로 변환 (DATA..., END)
pub fn encode_message(payload: &Bytes, max_fragment_size: usize) -> Vec<Frame> {
    let mut frames: Vec<Frame> = split(payload.clone(), max_fragment_size)
        .enumerate()
        .map(|(idx, fragment)| Frame::Data {
            seq: idx as u16,
            payload: fragment,
        })
        .collect();

    frames.push(Frame::End {
        count: frames.len() as u16,
        crc32: crc32fast::hash(payload),
    });
    frames
}
