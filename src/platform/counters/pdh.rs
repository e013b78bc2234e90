//! Windows Performance Data Helper query

use std::mem;
use std::ptr;

use windows_sys::Win32::System::Performance::{
    PdhAddEnglishCounterW, PdhCloseQuery, PdhCollectQueryData, PdhGetFormattedCounterArrayW,
    PdhGetFormattedCounterValue, PdhOpenQueryW, PDH_FMT_COUNTERVALUE,
    PDH_FMT_COUNTERVALUE_ITEM_W, PDH_FMT_DOUBLE, PDH_FMT_LARGE, PDH_HCOUNTER, PDH_HQUERY,
};

use super::CounterQuery;
use crate::error::BackendError;

const ERROR_SUCCESS: u32 = 0;
const PDH_MORE_DATA: u32 = 0x8000_07D2;
const PDH_CSTATUS_VALID_DATA: u32 = 0;
const PDH_CSTATUS_NEW_DATA: u32 = 1;
/// Keep engine sums above 100 instead of letting PDH cap each instance
const PDH_FMT_NOCAP100: u32 = 0x0000_8000;

struct Registered {
    handle: PDH_HCOUNTER,
    path: String,
    wildcard: bool,
}

pub struct PdhQuery {
    handle: PDH_HQUERY,
    counters: Vec<Registered>,
}

impl PdhQuery {
    pub fn open() -> Result<Self, BackendError> {
        let mut handle: PDH_HQUERY = unsafe { mem::zeroed() };
        let status = unsafe { PdhOpenQueryW(ptr::null(), 0, &mut handle) };
        if status != ERROR_SUCCESS {
            return Err(BackendError::counter_unavailable(format!(
                "PdhOpenQueryW failed: 0x{:08X}",
                status
            )));
        }
        Ok(Self {
            handle,
            counters: Vec::new(),
        })
    }

    fn registered(&self, counter: usize) -> Result<&Registered, BackendError> {
        self.counters
            .get(counter)
            .ok_or_else(|| BackendError::counter_unavailable(format!("unknown counter {}", counter)))
    }

    fn single_value(
        &self,
        counter: &Registered,
        format: u32,
    ) -> Result<PDH_FMT_COUNTERVALUE, BackendError> {
        let mut value: PDH_FMT_COUNTERVALUE = unsafe { mem::zeroed() };
        let status = unsafe {
            PdhGetFormattedCounterValue(counter.handle, format, ptr::null_mut(), &mut value)
        };
        if status != ERROR_SUCCESS || !valid(value.CStatus) {
            return Err(BackendError::counter_unavailable(format!(
                "{}: status 0x{:08X}",
                counter.path, status
            )));
        }
        Ok(value)
    }

    /// Every instance of a wildcard counter
    fn instance_values(
        &self,
        counter: &Registered,
        format: u32,
    ) -> Result<Vec<PDH_FMT_COUNTERVALUE>, BackendError> {
        let mut buffer_size: u32 = 0;
        let mut item_count: u32 = 0;
        let status = unsafe {
            PdhGetFormattedCounterArrayW(
                counter.handle,
                format,
                &mut buffer_size,
                &mut item_count,
                ptr::null_mut(),
            )
        };
        if status != PDH_MORE_DATA {
            return Err(BackendError::counter_unavailable(format!(
                "{}: status 0x{:08X}",
                counter.path, status
            )));
        }

        // The buffer also holds the instance name strings after the items
        let item_size = mem::size_of::<PDH_FMT_COUNTERVALUE_ITEM_W>();
        let slots = (buffer_size as usize).div_ceil(item_size);
        let mut items: Vec<PDH_FMT_COUNTERVALUE_ITEM_W> = Vec::with_capacity(slots);

        let status = unsafe {
            PdhGetFormattedCounterArrayW(
                counter.handle,
                format,
                &mut buffer_size,
                &mut item_count,
                items.as_mut_ptr(),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(BackendError::counter_unavailable(format!(
                "{}: status 0x{:08X}",
                counter.path, status
            )));
        }
        // SAFETY: PDH wrote `item_count` items at the front of the buffer
        unsafe { items.set_len((item_count as usize).min(slots)) };

        Ok(items
            .iter()
            .map(|item| item.FmtValue)
            .filter(|value| valid(value.CStatus))
            .collect())
    }
}

fn valid(status: u32) -> bool {
    status == PDH_CSTATUS_VALID_DATA || status == PDH_CSTATUS_NEW_DATA
}

impl CounterQuery for PdhQuery {
    type Counter = usize;

    fn add_counter(&mut self, path: &str) -> Result<usize, BackendError> {
        let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
        let mut handle: PDH_HCOUNTER = unsafe { mem::zeroed() };
        let status = unsafe { PdhAddEnglishCounterW(self.handle, wide.as_ptr(), 0, &mut handle) };
        if status != ERROR_SUCCESS {
            return Err(BackendError::counter_unavailable(format!(
                "{}: status 0x{:08X}",
                path, status
            )));
        }
        self.counters.push(Registered {
            handle,
            path: path.to_string(),
            wildcard: path.contains('*'),
        });
        Ok(self.counters.len() - 1)
    }

    fn collect(&mut self) -> Result<(), BackendError> {
        let status = unsafe { PdhCollectQueryData(self.handle) };
        if status != ERROR_SUCCESS {
            return Err(BackendError::counter_unavailable(format!(
                "PdhCollectQueryData failed: 0x{:08X}",
                status
            )));
        }
        Ok(())
    }

    fn read_double(&self, counter: usize) -> Result<f64, BackendError> {
        let counter = self.registered(counter)?;
        let format = PDH_FMT_DOUBLE | PDH_FMT_NOCAP100;
        if counter.wildcard {
            let values = self.instance_values(counter, format)?;
            Ok(values.iter().map(|v| unsafe { v.Anonymous.doubleValue }).sum())
        } else {
            let value = self.single_value(counter, format)?;
            Ok(unsafe { value.Anonymous.doubleValue })
        }
    }

    fn read_large(&self, counter: usize) -> Result<u64, BackendError> {
        let counter = self.registered(counter)?;
        let raw: i64 = if counter.wildcard {
            let values = self.instance_values(counter, PDH_FMT_LARGE)?;
            values
                .iter()
                .map(|v| unsafe { v.Anonymous.largeValue })
                .fold(0i64, i64::saturating_add)
        } else {
            let value = self.single_value(counter, PDH_FMT_LARGE)?;
            unsafe { value.Anonymous.largeValue }
        };
        Ok(raw.max(0) as u64)
    }

    fn close(&mut self) {
        if !self.handle.is_null() {
            let status = unsafe { PdhCloseQuery(self.handle) };
            if status != ERROR_SUCCESS {
                log::debug!("PdhCloseQuery failed: 0x{:08X}", status);
            }
            self.handle = ptr::null_mut();
            self.counters.clear();
        }
    }

    fn source(&self) -> String {
        "PDH".to_string()
    }
}
