//! Distributed Markov chain example.
//!
//! A probability distribution over `n` states is iterated under a sparse
//! transition matrix. Two containers alternate roles: the one being written
//! uses a block partitioning, the one being read switches to a derived
//! partitioning that also covers every incoming state of the local block,
//! so the update loop only touches local values. A master partitioning
//! collects the result for the checksum.
//!
//! Run with `cargo run --example markov -- [n] [fan_in] [iters]`.

use repart::prelude::*;
use std::sync::Arc;

struct MarkovGraph {
    n: usize,
    fan_in: usize,
    /// `incoming[i]` lists the states feeding state `i` (first entry: `i`).
    incoming: Vec<Vec<usize>>,
    /// `prob[i][j]` is the probability of the move `incoming[i][j] -> i`.
    prob: Vec<Vec<f64>>,
}

/// Ring-like chain with `fan_in` incoming edges per state, probabilities
/// normalized per source state.
fn build_graph(n: usize, fan_in: usize) -> MarkovGraph {
    let mut incoming = vec![Vec::with_capacity(fan_in + 1); n];
    let mut prob = vec![Vec::with_capacity(fan_in + 1); n];
    let mut out_sum = vec![0.0f64; n];

    for i in 0..n {
        incoming[i].push(i);
        prob[i].push(5.0);
        out_sum[i] += 5.0;
        let mut step = 1usize;
        for j in 1..=fan_in {
            let from = (i + step) % n;
            let p = ((j + i) % (5 * fan_in)) as f64 + 1.0;
            incoming[i].push(from);
            prob[i].push(p);
            out_sum[from] += p;
            step = 2 * step + j;
            while step > n {
                step -= n;
            }
        }
    }
    for i in 0..n {
        for j in 0..incoming[i].len() {
            prob[i][j] /= out_sum[incoming[i][j]];
        }
    }
    MarkovGraph {
        n,
        fan_in,
        incoming,
        prob,
    }
}

/// Read partitioning: every task gets each state of its written block plus
/// all states feeding it.
fn reader_partitioner(graph: Arc<MarkovGraph>) -> Partitioner {
    Partitioner::custom_with_base("markov-in", move |ba, base| {
        let base = base.ok_or(RepartError::PreconditionFailed("base required"))?;
        let space = ba.space();
        for e in base.iter() {
            let (from, to) = (e.range.from().get(0), e.range.to().get(0));
            for state in from..to {
                for &inc in &graph.incoming[state as usize] {
                    ba.append(e.task, Range::new_1d(space, inc as i64, inc as i64 + 1)?)?;
                }
            }
        }
        Ok(())
    })
}

fn run<C: Communicator>(
    graph: &MarkovGraph,
    iters: usize,
    data: &mut [Data<f64>; 2],
    p_write: &Arc<Partitioning>,
    p_read: &Arc<Partitioning>,
    comm: &C,
) -> Result<usize, RepartError> {
    let mut read = 0usize;
    for iter in 0.. {
        let (d_read, d_write) = {
            let [a, b] = data;
            if read == 0 { (a, b) } else { (b, a) }
        };
        d_read.switch_to(p_read, DataFlow::CopyIn, comm)?;
        let src_from = d_read.local_to_global(0)?;
        let src = d_read.map_default()?.to_vec();

        d_write.switch_to(p_write, DataFlow::CopyOut, comm)?;
        let (dst_from, dst_to) = p_write.my_slice_1d(0)?;
        let dst = d_write.map_default()?;
        assert_eq!(dst.len(), (dst_to - dst_from) as usize);

        for i in dst_from..dst_to {
            let state = i as usize;
            let mut v = 0.0;
            for (j, &inc) in graph.incoming[state].iter().enumerate() {
                v += src[(inc as i64 - src_from) as usize] * graph.prob[state][j];
            }
            dst[(i - dst_from) as usize] = v;
        }

        read = 1 - read;
        if iter + 1 >= iters {
            break;
        }
    }
    // index of the container written last
    Ok(read)
}

fn main() -> Result<(), RepartError> {
    let mut args = std::env::args().skip(1);
    let n: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(1000);
    let fan_in: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(4);
    let iters: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(10);

    let inst = Instance::single();
    let world = inst.world();
    let graph = Arc::new(build_graph(n, fan_in));
    if world.my_id() == 0 {
        println!(
            "Markov chain with {} states, fan-in {}, {iters} iterations",
            graph.n, graph.fan_in
        );
    }
    let space = Space::new_1d(n as u64)?;

    let p_write = Partitioning::new(
        "write",
        world,
        space,
        Arc::new(Partitioner::block_1d()),
        None,
    );
    let p_read = Partitioning::new(
        "read",
        world,
        space,
        Arc::new(reader_partitioner(graph.clone())),
        Some(&p_write),
    );
    let p_master = Partitioning::new("master", world, space, inst.master_partitioner(), None);

    let mut data = [
        Data::<f64>::new("prob1", world, space),
        Data::<f64>::new("prob2", world, space),
    ];

    // start with all probability on state 0
    data[0].switch_to(&p_write, DataFlow::Init(0.0), inst.comm())?;
    if let Some(off) = data[0].global_to_local(0) {
        data[0].map_default()?[off] = 1.0;
    }

    let last = run(&graph, iters, &mut data, &p_write, &p_read, inst.comm())?;

    let result = &mut data[last];
    result.switch_to(&p_master, DataFlow::CopyIn, inst.comm())?;
    if world.my_id() == 0 {
        let v = result.map_default()?;
        let sum: f64 = v.iter().sum();
        println!(
            "result: p0 = {:.6}, p1 = {:.6}, p2 = {:.6}, sum = {:.6}",
            v[0], v[1], v[2], sum
        );
        assert!((sum - 1.0).abs() < 1e-9);
    }
    Ok(())
}
