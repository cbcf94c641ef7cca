use std::{ffi::c_int, mem, ptr};

#[derive(Copy, Clone)]
#[repr(align(8))] // Conservative bound for align_of<libc::cmsghdr>
pub(crate) struct Aligned<T>(pub(crate) T);

/// Helper to encode a series of control messages ("cmsgs") to a buffer
/// for use in `sendmsg`.
///
/// The operation must be "finished" for the msghdr to be usable, either
/// by calling `finish` explicitly or by dropping the `Encoder`.
pub(crate) struct Encoder<'a> {
    hdr: &'a mut libc::msghdr,
    cmsg: Option<&'a mut libc::cmsghdr>,
    len: usize,
}

impl<'a> Encoder<'a> {
    /// # Safety
    ///
    /// - `hdr.msg_control` must point to memory outliving `'a` which can
    ///   hold `hdr.msg_controllen` bytes, aligned for `libc::cmsghdr`,
    ///   and valid for writes
    /// - The `Encoder` must be dropped before `hdr` is passed to a
    ///   system call, and must not be leaked
    pub(crate) unsafe fn new(hdr: &'a mut libc::msghdr) -> Self {
        Self {
            cmsg: libc::CMSG_FIRSTHDR(hdr).as_mut(),
            hdr,
            len: 0,
        }
    }

    /// Appends a control message to the buffer
    ///
    /// # Panics
    ///
    /// If insufficient buffer space remains.
    pub(crate) fn push<T: Copy>(&mut self, level: c_int, ty: c_int, value: T) {
        let space = unsafe { libc::CMSG_SPACE(mem::size_of_val(&value) as _) as usize };
        assert!(
            self.hdr.msg_controllen as usize >= self.len + space,
            "control message buffer too small"
        );
        let cmsg = self.cmsg.take().expect("no control buffer space remaining");
        cmsg.cmsg_level = level;
        cmsg.cmsg_type = ty;
        cmsg.cmsg_len = unsafe { libc::CMSG_LEN(mem::size_of_val(&value) as _) } as _;
        unsafe {
            ptr::write(libc::CMSG_DATA(cmsg) as *const T as *mut T, value);
        }
        self.len += space;
        self.cmsg = unsafe { libc::CMSG_NXTHDR(self.hdr, cmsg).as_mut() };
    }

    /// Finishes appending control messages to the buffer
    pub(crate) fn finish(self) {
        // Everything happens in drop
    }
}

// Statically guarantees that the msghdr is flushed even if a message is
// never sent.
impl Drop for Encoder<'_> {
    fn drop(&mut self) {
        self.hdr.msg_controllen = self.len as _;
        if self.len == 0 {
            // netbsd is particular about this being a NULL pointer if
            // there are no control messages.
            self.hdr.msg_control = ptr::null_mut();
        }
    }
}

/// # Safety
///
/// `cmsg` must refer to a control message containing a payload of type `T`
pub(crate) unsafe fn decode<T: Copy>(cmsg: &libc::cmsghdr) -> T {
    assert!(cmsg.cmsg_len as usize >= libc::CMSG_LEN(mem::size_of::<T>() as _) as usize);
    ptr::read(libc::CMSG_DATA(cmsg) as *const T)
}

pub(crate) struct Iter<'a> {
    hdr: &'a libc::msghdr,
    cmsg: Option<&'a libc::cmsghdr>,
}

impl<'a> Iter<'a> {
    /// # Safety
    ///
    /// `hdr.msg_control` must point to memory outliving `'a` which holds
    /// `hdr.msg_controllen` bytes of valid control messages, aligned for
    /// `libc::cmsghdr`
    pub(crate) unsafe fn new(hdr: &'a libc::msghdr) -> Self {
        Self {
            hdr,
            cmsg: libc::CMSG_FIRSTHDR(hdr).as_ref(),
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a libc::cmsghdr;
    fn next(&mut self) -> Option<&'a libc::cmsghdr> {
        let current = self.cmsg.take()?;
        self.cmsg = unsafe { libc::CMSG_NXTHDR(self.hdr, current).as_ref() };
        Some(current)
    }
}
