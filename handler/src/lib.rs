//! Asynchronous request/solution worker shared by the estimation and control
//! problems.
//!
//! A fixed-rate control loop posts requests without blocking and reads
//! whatever solution is currently published; a dedicated worker thread picks
//! up the newest pending request, runs a solve whose duration may span
//! several loop periods, and publishes the result. Request and solution live
//! in two independently locked records so readers never contend with the
//! poster.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

/// What a solve cycle produced. `Skipped` fast-forwards the solution
/// timestep without touching the published value; used to resynchronise
/// after an inconsistent request stream or to reject an invalid payload.
pub enum Outcome<S> {
    Solved(S),
    Skipped,
}

struct RequestSlot<R> {
    ts: i64,
    payload: R,
}

struct SolutionSlot<S> {
    ts: i64,
    value: S,
}

struct Shared<R, S> {
    rqst: Mutex<RequestSlot<R>>,
    rqst_cv: Condvar,
    sol: Mutex<SolutionSlot<S>>,
    done: AtomicBool,
}

/// Worker-thread wrapper around a solve problem `P`.
///
/// The problem is owned by the worker while running and handed back on
/// `end`, so no solve state is ever shared between threads; only the
/// request and solution records cross the boundary.
pub struct Handler<R, S, P> {
    shared: Arc<Shared<R, S>>,
    problem: Option<P>,
    worker: Option<JoinHandle<P>>,
}

impl<R, S, P> Handler<R, S, P>
where
    R: Default + Send + 'static,
    S: Clone + Send + 'static,
    P: Send + 'static,
{
    pub fn new(problem: P, initial_solution: S) -> Handler<R, S, P> {
        Handler {
            shared: Arc::new(Shared {
                rqst: Mutex::new(RequestSlot {
                    ts: -1,
                    payload: R::default(),
                }),
                rqst_cv: Condvar::new(),
                sol: Mutex::new(SolutionSlot {
                    ts: -1,
                    value: initial_solution,
                }),
                done: AtomicBool::new(false),
            }),
            problem: Some(problem),
            worker: None,
        }
    }

    /// Spawns the worker thread. The solve closure receives the problem, the
    /// request timestep, the drained payload, the solution timestep at pickup
    /// time and the last published solution. A no-op when already running.
    pub fn start<F>(&mut self, mut solve: F)
    where
        F: FnMut(&mut P, i64, R, i64, &S) -> Outcome<S> + Send + 'static,
    {
        if self.worker.is_some() {
            return;
        }
        let mut problem = match self.problem.take() {
            Some(problem) => problem,
            None => return,
        };

        {
            let mut rqst = self.shared.rqst.lock().unwrap();
            rqst.ts = -1;
            rqst.payload = R::default();
        }
        self.shared.sol.lock().unwrap().ts = -1;
        self.shared.done.store(false, Ordering::SeqCst);

        let shared = self.shared.clone();
        self.worker = Some(thread::spawn(move || {
            debug!("handler worker started");
            loop {
                let (ts, payload, sol_ts, last) = {
                    let mut rqst = shared.rqst.lock().unwrap();
                    let (sol_ts, last) = loop {
                        if shared.done.load(Ordering::SeqCst) {
                            debug!("handler worker stopping");
                            return problem;
                        }
                        {
                            let sol = shared.sol.lock().unwrap();
                            if rqst.ts > sol.ts {
                                break (sol.ts, sol.value.clone());
                            }
                        }
                        rqst = shared.rqst_cv.wait(rqst).unwrap();
                    };
                    (rqst.ts, mem::take(&mut rqst.payload), sol_ts, last)
                };

                let outcome = solve(&mut problem, ts, payload, sol_ts, &last);

                let mut sol = shared.sol.lock().unwrap();
                sol.ts = ts;
                if let Outcome::Solved(value) = outcome {
                    sol.value = value;
                }
            }
        }));
    }

    /// Stops the worker and reclaims the problem. A no-op when already
    /// stopped.
    pub fn end(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.done.store(true, Ordering::SeqCst);
            self.shared.rqst_cv.notify_one();
            let problem = worker.join().expect("handler worker panicked");
            self.problem = Some(problem);
        }
    }

    /// Clears both timestep counters. Only meaningful while stopped; ignored
    /// (with a warning) while the worker is running.
    pub fn reset(&mut self) {
        if self.worker.is_some() {
            warn!("handler reset ignored while running");
            return;
        }
        {
            let mut rqst = self.shared.rqst.lock().unwrap();
            rqst.ts = -1;
            rqst.payload = R::default();
        }
        self.shared.sol.lock().unwrap().ts = -1;
    }

    /// Non-blocking from the worker's point of view: updates the pending
    /// request under its own lock and wakes the worker.
    pub fn post_request<F: FnOnce(&mut R)>(&self, ts: i64, fill: F) {
        let mut rqst = self.shared.rqst.lock().unwrap();
        rqst.ts = ts;
        fill(&mut rqst.payload);
        self.shared.rqst_cv.notify_one();
    }

    /// Latest published solution and its timestep. Never blocks on a solve.
    pub fn solution(&self) -> (i64, S) {
        let sol = self.shared.sol.lock().unwrap();
        (sol.ts, sol.value.clone())
    }

    pub fn solution_ts(&self) -> i64 {
        self.shared.sol.lock().unwrap().ts
    }

    /// Overwrites the published value without touching its timestep. Used to
    /// seed an initial estimate before `start`.
    pub fn set_solution(&self, value: S) {
        self.shared.sol.lock().unwrap().value = value;
    }

    /// Access to the problem between runs (for zeroing state between
    /// trials). `None` while the worker owns it.
    pub fn problem_mut(&mut self) -> Option<&mut P> {
        self.problem.as_mut()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl<R, S, P> Drop for Handler<R, S, P> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.done.store(true, Ordering::SeqCst);
            self.shared.rqst_cv.notify_one();
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for_ts<R, S, P>(handler: &Handler<R, S, P>, ts: i64)
    where
        R: Default + Send + 'static,
        S: Clone + Send + 'static,
        P: Send + 'static,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while handler.solution_ts() < ts {
            assert!(Instant::now() < deadline, "worker never reached ts {}", ts);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn accumulates_coalesced_requests() {
        // the "problem" is a running sum; requests may arrive batched but
        // none may be lost
        let mut handler: Handler<Vec<i64>, i64, i64> = Handler::new(0, 0);
        handler.start(|acc, _ts, payload, _sol_ts, _last| {
            thread::sleep(Duration::from_millis(5));
            *acc += payload.iter().sum::<i64>();
            Outcome::Solved(*acc)
        });

        for ts in 0..20 {
            handler.post_request(ts, |payload| payload.push(ts + 1));
        }
        wait_for_ts(&handler, 19);
        handler.end();

        let (ts, total) = handler.solution();
        assert_eq!(ts, 19);
        assert_eq!(total, (1..=20).sum::<i64>());
    }

    #[test]
    fn solution_timesteps_are_monotonic() {
        let mut handler: Handler<Vec<i64>, i64, i64> = Handler::new(0, 0);
        handler.start(|acc, ts, _payload, _sol_ts, _last| {
            *acc += 1;
            Outcome::Solved(ts)
        });

        let mut last_seen = -1;
        for ts in 0..50 {
            handler.post_request(ts, |payload| payload.push(ts));
            let seen = handler.solution_ts();
            assert!(seen >= last_seen, "solution ts went backwards");
            last_seen = seen;
        }
        wait_for_ts(&handler, 49);
        handler.end();
        assert_eq!(handler.solution_ts(), 49);
    }

    #[test]
    fn skipped_outcome_keeps_value_but_advances_ts() {
        let mut handler: Handler<Vec<i64>, i64, ()> = Handler::new((), 42);
        handler.start(|_problem, _ts, payload, _sol_ts, last| {
            if payload.contains(&-1) {
                Outcome::Skipped
            } else {
                Outcome::Solved(last + 1)
            }
        });

        handler.post_request(0, |payload| payload.push(-1));
        wait_for_ts(&handler, 0);
        let (ts, value) = handler.solution();
        assert_eq!(ts, 0);
        assert_eq!(value, 42);

        handler.post_request(1, |payload| payload.push(7));
        wait_for_ts(&handler, 1);
        let (ts, value) = handler.solution();
        assert_eq!(ts, 1);
        assert_eq!(value, 43);

        handler.end();
    }

    #[test]
    fn end_is_idempotent_and_restartable() {
        let mut handler: Handler<Vec<i64>, i64, i64> = Handler::new(0, 0);
        handler.end();
        assert!(!handler.is_running());

        handler.start(|acc, _ts, payload, _sol_ts, _last| {
            *acc += payload.len() as i64;
            Outcome::Solved(*acc)
        });
        assert!(handler.is_running());
        handler.post_request(0, |payload| payload.push(1));
        wait_for_ts(&handler, 0);
        handler.end();
        handler.end();

        // problem state survives the stop/start cycle
        assert_eq!(*handler.problem_mut().unwrap(), 1);

        handler.start(|acc, _ts, payload, _sol_ts, _last| {
            *acc += payload.len() as i64;
            Outcome::Solved(*acc)
        });
        handler.post_request(0, |payload| payload.push(1));
        wait_for_ts(&handler, 0);
        handler.end();
        assert_eq!(*handler.problem_mut().unwrap(), 2);
    }

    #[test]
    fn seeded_solution_is_visible_to_the_worker() {
        let mut handler: Handler<Vec<i64>, i64, ()> = Handler::new((), 0);
        handler.set_solution(100);
        handler.start(|_problem, _ts, _payload, _sol_ts, last| Outcome::Solved(last + 1));

        handler.post_request(0, |payload| payload.push(0));
        wait_for_ts(&handler, 0);
        handler.end();

        let (_, value) = handler.solution();
        assert_eq!(value, 101);
    }
}
