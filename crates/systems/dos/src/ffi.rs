//! C interface over [`DosMachine`]
//!
//! A caller creates a machine, loads an image, runs it and asks for the
//! register report. Handles and strings returned here are owned by this
//! library and must go back through `emu8086_destroy` and
//! `emu8086_free_string`.

use std::ffi::{c_char, CString};
use std::ptr;
use std::slice;

use crate::{DosError, DosMachine};

/// Status codes returned by the fallible calls
pub const EMU8086_OK: i32 = 0;
pub const EMU8086_NULL_POINTER: i32 = -1;
pub const EMU8086_INVALID_EXECUTABLE: i32 = -2;
pub const EMU8086_NO_EXECUTABLE: i32 = -3;
pub const EMU8086_CPU_FAULT: i32 = -4;

fn status_code(err: &DosError) -> i32 {
    match err {
        DosError::InvalidExecutable(_) => EMU8086_INVALID_EXECUTABLE,
        DosError::NoExecutable => EMU8086_NO_EXECUTABLE,
        DosError::Cpu(_) => EMU8086_CPU_FAULT,
    }
}

fn into_c_string(text: String) -> *mut c_char {
    match CString::new(text) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Create a machine with the default configuration
#[no_mangle]
pub extern "C" fn emu8086_create() -> *mut DosMachine {
    Box::into_raw(Box::new(DosMachine::new()))
}

/// # Safety
///
/// `machine` must be null or a pointer from `emu8086_create` that has not
/// been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn emu8086_destroy(machine: *mut DosMachine) {
    if !machine.is_null() {
        drop(Box::from_raw(machine));
    }
}

/// Load a `.com` image. Returns `EMU8086_OK` or a negative status.
///
/// # Safety
///
/// `machine` must come from `emu8086_create`; `data` must point to `len`
/// readable bytes.
#[no_mangle]
pub unsafe extern "C" fn emu8086_load_com(machine: *mut DosMachine, data: *const u8, len: usize) -> i32 {
    let Some(machine) = machine.as_mut() else {
        return EMU8086_NULL_POINTER;
    };
    if data.is_null() {
        return EMU8086_NULL_POINTER;
    }
    let image = slice::from_raw_parts(data, len);
    match machine.load_com(image) {
        Ok(()) => EMU8086_OK,
        Err(err) => status_code(&err),
    }
}

/// Run up to `max_steps` instructions. Returns the number executed, or a
/// negative status.
///
/// # Safety
///
/// `machine` must come from `emu8086_create`.
#[no_mangle]
pub unsafe extern "C" fn emu8086_run(machine: *mut DosMachine, max_steps: u64) -> i64 {
    let Some(machine) = machine.as_mut() else {
        return EMU8086_NULL_POINTER as i64;
    };
    match machine.run(max_steps) {
        Ok(summary) => summary.steps.min(i64::MAX as u64) as i64,
        Err(err) => status_code(&err) as i64,
    }
}

/// Exit code of a terminated program, or -1 while it has not exited
///
/// # Safety
///
/// `machine` must come from `emu8086_create`.
#[no_mangle]
pub unsafe extern "C" fn emu8086_exit_code(machine: *const DosMachine) -> i32 {
    match machine.as_ref().and_then(DosMachine::exit_code) {
        Some(code) => code as i32,
        None => -1,
    }
}

/// Formatted register and flag report. Free with `emu8086_free_string`.
///
/// # Safety
///
/// `machine` must come from `emu8086_create`.
#[no_mangle]
pub unsafe extern "C" fn emu8086_register_state(machine: *const DosMachine) -> *mut c_char {
    match machine.as_ref() {
        Some(machine) => into_c_string(machine.register_snapshot().to_string()),
        None => ptr::null_mut(),
    }
}

/// Machine report as JSON. Free with `emu8086_free_string`.
///
/// # Safety
///
/// `machine` must come from `emu8086_create`.
#[no_mangle]
pub unsafe extern "C" fn emu8086_register_state_json(machine: *const DosMachine) -> *mut c_char {
    let Some(machine) = machine.as_ref() else {
        return ptr::null_mut();
    };
    match machine.report().to_json_pretty() {
        Ok(json) => into_c_string(json),
        Err(_) => ptr::null_mut(),
    }
}

/// Console output produced since the last call. Free with
/// `emu8086_free_string`.
///
/// # Safety
///
/// `machine` must come from `emu8086_create`.
#[no_mangle]
pub unsafe extern "C" fn emu8086_take_output(machine: *mut DosMachine) -> *mut c_char {
    let Some(machine) = machine.as_mut() else {
        return ptr::null_mut();
    };
    let bytes: Vec<u8> = machine.take_output().into_iter().filter(|&b| b != 0).collect();
    into_c_string(String::from_utf8_lossy(&bytes).into_owned())
}

/// # Safety
///
/// `s` must be null or a string returned by this library that has not been
/// freed yet.
#[no_mangle]
pub unsafe extern "C" fn emu8086_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
