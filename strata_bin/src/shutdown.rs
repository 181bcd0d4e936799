//! Signal-driven shutdown: SIGINT/SIGTERM close the database and exit 0.
//!
//! The handler itself only writes one byte into a pipe (the only thing
//! that is safe from signal context); a watcher thread does the real work.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;

use strata::database::Database;

static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_signal(_signum: libc::c_int) {
    let fd = PIPE_WRITE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        unsafe {
            libc::write(fd, b"x".as_ptr().cast(), 1);
        }
    }
}

/// Install the handlers and spawn the watcher thread.
pub fn install(db: Arc<Database>) -> std::io::Result<()> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    PIPE_WRITE_FD.store(fds[1], Ordering::SeqCst);
    unsafe {
        libc::signal(libc::SIGINT, on_signal as usize);
        libc::signal(libc::SIGTERM, on_signal as usize);
    }

    let read_fd = fds[0];
    thread::spawn(move || {
        let mut byte = [0u8; 1];
        unsafe {
            libc::read(read_fd, byte.as_mut_ptr().cast(), 1);
        }
        println!("close handler invoked");
        if let Err(err) = db.close() {
            eprintln!("close failed: {err}");
        }
        std::process::exit(0);
    });
    Ok(())
}
