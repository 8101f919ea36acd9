// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw tty access for serial peers.
//!
//! The port is opened non-blocking, locked exclusively and switched to raw
//! 8N1 without flow control.

use std::ffi::CString;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::thread;
use std::time::Duration;

use super::SerialIo;

fn speed_for(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return None,
    };
    Some(speed)
}

fn check(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// An open tty device.
#[derive(Debug)]
pub struct SerialPort {
    fd: OwnedFd,
    path: String,
}

impl SerialPort {
    pub fn open(path: &str, baud: u32) -> io::Result<Self> {
        let speed = speed_for(baud).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {}", baud),
            )
        })?;
        let c_path = CString::new(path)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;

        // SAFETY: c_path is a valid NUL-terminated string.
        let raw = check(unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        })?;
        // SAFETY: raw was just returned by open() and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: fd is open for the duration of these calls.
        if unsafe { libc::isatty(fd.as_raw_fd()) } != 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a tty", path),
            ));
        }
        // SAFETY: as above.
        if unsafe { libc::flock(fd.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("{} is locked by another process", path),
                ));
            }
        }

        configure(fd.as_raw_fd(), speed)?;
        log::debug!("[serial] opened {} at {} baud", path, baud);
        Ok(Self {
            fd,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Pulse DTR/RTS to reset the board, wait for it to boot, then drop
    /// whatever it printed meanwhile.
    pub fn reset(&self, settle: Duration) -> io::Result<()> {
        let lines: libc::c_int = libc::TIOCM_DTR | libc::TIOCM_RTS;
        // SAFETY: TIOCMBIC/TIOCMBIS read a c_int through the pointer.
        check(unsafe { libc::ioctl(self.fd.as_raw_fd(), libc::TIOCMBIC, &lines) })?;
        thread::sleep(Duration::from_millis(100));
        // SAFETY: as above.
        check(unsafe { libc::ioctl(self.fd.as_raw_fd(), libc::TIOCMBIS, &lines) })?;
        thread::sleep(settle);
        // SAFETY: fd is a valid tty.
        check(unsafe { libc::tcflush(self.fd.as_raw_fd(), libc::TCIOFLUSH) })?;
        Ok(())
    }
}

fn configure(fd: RawFd, speed: libc::speed_t) -> io::Result<()> {
    // SAFETY: termios is plain data; tcgetattr fills it before use.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: fd is a valid tty, tio is a valid termios.
    check(unsafe { libc::tcgetattr(fd, &mut tio) })?;

    tio.c_iflag = libc::IGNBRK;
    tio.c_oflag = 0;
    tio.c_lflag = 0;
    tio.c_cflag = libc::CS8 | libc::CREAD | libc::CLOCAL;
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: tio is a valid termios.
    check(unsafe { libc::cfsetospeed(&mut tio, speed) })?;
    // SAFETY: as above.
    check(unsafe { libc::cfsetispeed(&mut tio, speed) })?;
    // SAFETY: fd is a valid tty, tio fully initialised.
    check(unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) })?;
    Ok(())
}

impl Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buf is valid for buf.len() bytes.
        let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if n == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial device closed",
            ));
        }
        Ok(n as usize)
    }
}

impl Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: buf is valid for buf.len() bytes.
        let n = unsafe { libc::write(self.fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialIo for SerialPort {
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.fd.as_raw_fd())
    }
}
