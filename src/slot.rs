// Copyright 2018-2026 the Deno authors. MIT license.

use std::sync::Arc;
use std::sync::Mutex;
use std::task::Poll;
use std::task::Waker;

use futures::future::poll_fn;

use crate::error::ParseError;

#[derive(Debug)]
enum State {
  Pending { offset: usize, length: usize },
  Ready(Arc<[u8]>),
  Taken,
  Failed(ParseError),
}

#[derive(Debug)]
struct Inner {
  state: State,
  wakers: Vec<Waker>,
}

/// A cell holding one module body (source or source map).
///
/// Clones share the same cell. A slot starts `Pending` with the body's
/// region coordinates, becomes `Ready` exactly once when the streaming
/// loader reaches its region and `Taken` when a caller takes the bytes
/// out. If loading aborts, pending slots terminate as `Failed` and every
/// waiter observes the cause. A slot never leaves a terminal state.
#[derive(Debug, Clone)]
pub(crate) struct SourceSlot(Arc<Mutex<Inner>>);

impl SourceSlot {
  pub fn pending(offset: usize, length: usize) -> SourceSlot {
    SourceSlot::new(State::Pending { offset, length })
  }

  pub fn ready(bytes: Arc<[u8]>) -> SourceSlot {
    SourceSlot::new(State::Ready(bytes))
  }

  fn new(state: State) -> SourceSlot {
    SourceSlot(Arc::new(Mutex::new(Inner {
      state,
      wakers: Vec::new(),
    })))
  }

  /// The `(offset, length)` region coordinates of a still pending body.
  pub fn pending_coords(&self) -> Option<(usize, usize)> {
    match &self.0.lock().unwrap().state {
      State::Pending { offset, length } => Some((*offset, *length)),
      _ => None,
    }
  }

  /// Snapshot of a loaded body. Panics while the body is still pending or
  /// after it was taken; the serializer only runs on fully loaded
  /// archives.
  pub fn bytes(&self) -> Arc<[u8]> {
    match &self.0.lock().unwrap().state {
      State::Ready(bytes) => bytes.clone(),
      _ => panic!("module body is not loaded"),
    }
  }

  /// Fill a pending slot and wake every waiter. At most one ready
  /// transition ever happens per slot.
  pub fn set_ready(&self, bytes: Vec<u8>) {
    let wakers = {
      let mut inner = self.0.lock().unwrap();
      debug_assert!(matches!(inner.state, State::Pending { .. }));
      inner.state = State::Ready(Arc::from(bytes));
      std::mem::take(&mut inner.wakers)
    };
    for waker in wakers {
      waker.wake();
    }
  }

  /// Terminate a pending slot with the failure that aborted loading.
  /// Slots that already hold their bytes are left as they are.
  pub fn fail(&self, err: &ParseError) {
    let wakers = {
      let mut inner = self.0.lock().unwrap();
      if !matches!(inner.state, State::Pending { .. }) {
        return;
      }
      inner.state = State::Failed(err.clone());
      std::mem::take(&mut inner.wakers)
    };
    for waker in wakers {
      waker.wake();
    }
  }

  /// Wait until the body is available and get a shared view of it.
  /// `Ok(None)` once the bytes have been taken out of the slot.
  pub async fn get(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
    poll_fn(|cx| {
      let mut inner = self.0.lock().unwrap();
      match &inner.state {
        State::Pending { .. } => {
          inner.wakers.push(cx.waker().clone());
          Poll::Pending
        }
        State::Ready(bytes) => Poll::Ready(Ok(Some(bytes.clone()))),
        State::Taken => Poll::Ready(Ok(None)),
        State::Failed(err) => Poll::Ready(Err(err.clone())),
      }
    })
    .await
  }

  /// Wait until the body is available and take it out of the slot. The
  /// first caller gets the bytes; later calls return `Ok(None)`.
  pub async fn take(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
    poll_fn(|cx| {
      let mut inner = self.0.lock().unwrap();
      match &inner.state {
        State::Pending { .. } => {
          inner.wakers.push(cx.waker().clone());
          Poll::Pending
        }
        State::Ready(_) => {
          let State::Ready(bytes) =
            std::mem::replace(&mut inner.state, State::Taken)
          else {
            unreachable!()
          };
          Poll::Ready(Ok(Some(bytes)))
        }
        State::Taken => Poll::Ready(Ok(None)),
        State::Failed(err) => Poll::Ready(Err(err.clone())),
      }
    })
    .await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use futures::FutureExt;

  use super::SourceSlot;
  use crate::error::ParseError;

  #[tokio::test]
  async fn get_is_shared_and_take_is_one_shot() {
    let slot = SourceSlot::ready(Arc::from(b"body".as_slice()));
    assert_eq!(slot.get().await.unwrap().unwrap().as_ref(), b"body");
    assert_eq!(slot.get().await.unwrap().unwrap().as_ref(), b"body");
    assert_eq!(slot.take().await.unwrap().unwrap().as_ref(), b"body");
    assert_eq!(slot.take().await.unwrap(), None);
    assert_eq!(slot.get().await.unwrap(), None);
  }

  #[tokio::test]
  async fn waiters_are_woken_on_ready() {
    let slot = SourceSlot::pending(0, 4);
    let reader = slot.clone();
    let (bytes, _) = futures::join!(reader.get(), async {
      slot.set_ready(b"body".to_vec());
    });
    assert_eq!(bytes.unwrap().unwrap().as_ref(), b"body");
  }

  #[tokio::test]
  async fn failure_reaches_every_waiter() {
    let slot = SourceSlot::pending(0, 4);
    let reader = slot.clone();
    let (result, _) = futures::join!(reader.take(), async {
      slot.fail(&ParseError::InvalidV2);
    });
    assert!(matches!(result, Err(ParseError::InvalidV2)));
    // terminal: later calls keep failing
    assert!(matches!(slot.get().await, Err(ParseError::InvalidV2)));
  }

  #[tokio::test]
  async fn failing_a_loaded_slot_is_a_no_op() {
    let slot = SourceSlot::ready(Arc::from(b"body".as_slice()));
    slot.fail(&ParseError::InvalidV2);
    assert_eq!(slot.get().await.unwrap().unwrap().as_ref(), b"body");
  }

  #[tokio::test]
  async fn dropping_a_wait_leaves_the_slot_undisturbed() {
    let slot = SourceSlot::pending(0, 4);
    assert!(slot.take().now_or_never().is_none());
    assert_eq!(slot.pending_coords(), Some((0, 4)));
    slot.set_ready(b"body".to_vec());
    assert_eq!(slot.take().await.unwrap().unwrap().as_ref(), b"body");
  }
}
