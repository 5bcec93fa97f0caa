//! Tick-driven deferred tasks
//!
//! The engine runs on one thread that is driven once per frame. Deferred work
//! is queued here with a due tick and handed back by [`TickScheduler::advance`]
//! when that tick arrives. A task is cancelled through its handle; a cancelled
//! or already fired handle is inert, so a superseded task can never fire late.

/// Identifies one scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: u64,
}

#[derive(Debug)]
struct ScheduledTask<T> {
    id: u64,
    due_tick: u64,
    payload: T,
}

#[derive(Debug)]
pub struct TickScheduler<T> {
    current_tick: u64,
    next_id: u64,
    tasks: Vec<ScheduledTask<T>>,
}

impl<T> Default for TickScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TickScheduler<T> {
    pub fn new() -> Self {
        Self {
            current_tick: 0,
            next_id: 0,
            tasks: Vec::new(),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Queue `payload` for the next tick
    pub fn schedule_next_tick(&mut self, payload: T) -> TaskHandle {
        self.schedule_in(1, payload)
    }

    /// Queue `payload` to fire `delay` ticks from now (at least one)
    pub fn schedule_in(&mut self, delay: u64, payload: T) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(ScheduledTask {
            id,
            due_tick: self.current_tick.saturating_add(delay.max(1)),
            payload,
        });
        TaskHandle { id }
    }

    /// Remove a task before it fires, returning its payload
    pub fn cancel(&mut self, handle: TaskHandle) -> Option<T> {
        let index = self.tasks.iter().position(|t| t.id == handle.id)?;
        Some(self.tasks.remove(index).payload)
    }

    /// Move to the next tick and return every task now due, in scheduling order
    pub fn advance(&mut self) -> Vec<T> {
        self.current_tick += 1;
        let now = self.current_tick;

        let (due, waiting): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|t| t.due_tick <= now);
        self.tasks = waiting;

        due.into_iter().map(|t| t.payload).collect()
    }

    /// Drop every pending task. The tick counter keeps running.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
