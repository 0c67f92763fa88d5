//! # Run Loop
//!
//! Drives one guest thread through its run-state machine on the calling
//! host thread. The record lock is held except while guest code executes.

use super::{GuestThread, RunState};
use orrery_hal::cpu::REG_RETURN;

/// Execute `thread` until it exits
///
/// Returns `false` when the backend reported an internal failure; the
/// thread is then in `Exit`. Returns `true` on natural completion or when
/// another party forced `Exit`.
pub fn run_thread(thread: &GuestThread) -> bool {
    let mut control = thread.lock();
    loop {
        match control.state {
            RunState::Exit => return true,
            RunState::Wait => control = thread.wait_for_change(control),
            RunState::Run | RunState::Step => {
                let stepping = control.state == RunState::Step;
                drop(control);

                let res = if stepping {
                    thread.cpu().step(thread.entry_point())
                } else {
                    thread.cpu().run(thread.entry_point())
                };

                control = thread.lock();
                if stepping {
                    thread.transition(&mut control, RunState::Wait);
                }
                if cfg!(feature = "gdbstub") && thread.cpu().breakpoint_hit() {
                    thread.transition(&mut control, RunState::Wait);
                    log::info!("Stopping thread \"{}\" at breakpoint.", thread.name());
                }
                if res < 0 {
                    log::error!("Thread {} experienced a CPU error ({}).", thread.name(), res);
                    thread.set_exit_code(thread.cpu().read_register(REG_RETURN));
                    thread.transition(&mut control, RunState::Exit);
                    return false;
                }
                if control.state == RunState::Run {
                    // Observers of `Exit` read the code right away.
                    thread.set_exit_code(thread.cpu().read_register(REG_RETURN));
                    thread.transition(&mut control, RunState::Exit);
                    return true;
                }
            }
        }
    }
}
