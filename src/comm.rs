//! Communication abstraction for single-process, intra-process (threads)
//! and inter-process (MPI) byte transport.
//!
//! The core only ever moves untyped bytes: element layout is handled by the
//! layouts' pack/unpack, and per ordered pair `(src, dst, tag)` messages are
//! delivered in the order they were sent. That FIFO guarantee is what the
//! sparse layout's external-slot cursor relies on.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier, Condvar, Mutex};

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
///
/// Implementors provide asynchronous send/receive and a collective barrier.
/// Receivers may truncate to their provided buffer length; the transition
/// engine always knows exact lengths up front.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this worker (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of workers.
    fn size(&self) -> usize;

    /// Synchronization barrier across all workers.
    fn barrier(&self) {}
}

/// No-op transport for a single worker.
///
/// The transfer planner turns all same-rank movement into local copies, so
/// this communicator never sees a message.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: one worker per thread, mailbox transport ---

type Key = (usize, usize, u16); // (src, dst, tag)
type Cell = Arc<(Mutex<VecDeque<Vec<u8>>>, Condvar)>;

/// Shared state of one group of thread workers.
///
/// Unlike a process-global mailbox, a universe is an explicit object, so
/// concurrently running tests cannot see each other's messages.
struct Universe {
    map: Mutex<HashMap<Key, Cell>>,
    barrier: Barrier,
}

impl Universe {
    fn cell(&self, key: Key) -> Cell {
        let mut g = self.map.lock().expect("mailbox poisoned");
        g.entry(key)
            .or_insert_with(|| Arc::new((Mutex::new(VecDeque::new()), Condvar::new())))
            .clone()
    }
}

/// Intra-process communicator: `size` workers on `size` threads sharing a
/// mailbox universe. Construct one set per worker group with
/// [`ThreadComm::universe`].
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Universe>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// Create the communicators of an `n`-worker universe, one per rank.
    pub fn universe(n: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Universe {
            map: Mutex::new(HashMap::new()),
            barrier: Barrier::new(n),
        });
        (0..n)
            .map(|rank| ThreadComm {
                rank,
                size: n,
                shared: shared.clone(),
            })
            .collect()
    }
}

pub struct ThreadSendHandle;

impl Wait for ThreadSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct ThreadRecvHandle {
    cell: Cell,
    want_len: usize,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.cell;
        let mut q = lock.lock().expect("mailbox slot poisoned");
        while q.is_empty() {
            q = cv.wait(q).expect("condvar poisoned");
        }
        let mut msg = q.pop_front().expect("queue non-empty");
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let cell = self.shared.cell((self.rank, peer, tag));
        let (lock, cv) = &*cell;
        {
            let mut q = lock.lock().expect("mailbox slot poisoned");
            q.push_back(buf.to_vec());
        }
        cv.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        ThreadRecvHandle {
            cell: self.shared.cell((peer, self.rank, tag)),
            want_len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

// --- MPI backend ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use core::ptr::NonNull;
    use mpi::collective::CommunicatorCollectives;
    use mpi::environment::Universe as MpiUniverse;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    /// Inter-process communicator over rsmpi's world communicator.
    pub struct MpiComm {
        _universe: MpiUniverse,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Default for MpiComm {
        fn default() -> Self {
            let uni = mpi::initialize().expect("MPI already initialized");
            let world = uni.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: uni,
                world,
                rank,
                size,
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            use mpi::request::StaticScope;
            let boxed = buf.to_vec().into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice: &[u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, slice, tag as i32);
            MpiSendHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, template: &mut [u8]) -> Self::RecvHandle {
            use mpi::request::StaticScope;
            let len = template.len();
            let boxed = vec![0u8; len].into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice_mut: &mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, slice_mut, tag as i32);
            MpiRecvHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }

    pub struct MpiSendHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }

    pub struct MpiRecvHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            let ptr = self.buf.take()?;
            let boxed: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
            let mut v = Vec::from(boxed);
            v.truncate(self.len);
            Some(v)
        }
    }

    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
