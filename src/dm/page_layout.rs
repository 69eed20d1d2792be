//! Byte layout for the two page kinds: the anchor page (page 1) and data
//! pages (spec.md §3). Anchor-page helpers operate on the page buffer
//! directly since page 1 never holds data items.

use rand::RngCore;

/// Offset of the open/close marker pair within page 1.
pub const PAGE_ONE_CHECK_OFFSET: usize = 100;
pub const PAGE_ONE_CHECK_LEN: usize = 8;

/// Free-space-offset header at the start of every data page.
const PAGE_X_FSO_LEN: usize = 2;

pub fn page_one_init_raw(page_size: usize) -> Vec<u8> {
    let mut data = vec![0u8; page_size];
    // Creation counts as the first "open": the two halves must differ
    // until the first `close()`, otherwise a crash between `create()` and
    // a graceful shutdown would falsely read back as a clean prior run
    // and skip recovery entirely.
    page_one_set_valid_open(&mut data);
    data
}

pub fn page_one_set_valid_open(data: &mut [u8]) {
    let mut bytes = [0u8; PAGE_ONE_CHECK_LEN];
    rand::rng().fill_bytes(&mut bytes);
    data[PAGE_ONE_CHECK_OFFSET..PAGE_ONE_CHECK_OFFSET + PAGE_ONE_CHECK_LEN].copy_from_slice(&bytes);
}

pub fn page_one_set_valid_close(data: &mut [u8]) {
    let (open_half, rest) = data.split_at_mut(PAGE_ONE_CHECK_OFFSET + PAGE_ONE_CHECK_LEN);
    let open = &open_half[PAGE_ONE_CHECK_OFFSET..];
    rest[..PAGE_ONE_CHECK_LEN].copy_from_slice(open);
}

/// `true` when the open/close marker halves match, i.e. the file was
/// closed cleanly last time and no recovery is needed.
pub fn page_one_check_valid(data: &[u8]) -> bool {
    let open = &data[PAGE_ONE_CHECK_OFFSET..PAGE_ONE_CHECK_OFFSET + PAGE_ONE_CHECK_LEN];
    let close = &data[PAGE_ONE_CHECK_OFFSET + PAGE_ONE_CHECK_LEN
        ..PAGE_ONE_CHECK_OFFSET + 2 * PAGE_ONE_CHECK_LEN];
    open == close
}

pub fn page_x_init_raw(page_size: usize) -> Vec<u8> {
    let mut data = vec![0u8; page_size];
    page_x_set_free_space_offset(&mut data, PAGE_X_FSO_LEN as u16);
    data
}

pub fn page_x_free_space_offset(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}

pub fn page_x_set_free_space_offset(data: &mut [u8], offset: u16) {
    data[0..PAGE_X_FSO_LEN].copy_from_slice(&offset.to_be_bytes());
}

pub fn page_x_max_free_space(page_size: usize) -> usize {
    page_size - PAGE_X_FSO_LEN
}

pub fn page_x_free_space(data: &[u8], page_size: usize) -> usize {
    page_size - page_x_free_space_offset(data) as usize
}

/// Appends `raw` at the page's current free-space offset and returns the
/// offset it was written at.
pub fn page_x_insert(data: &mut [u8], raw: &[u8]) -> u16 {
    let offset = page_x_free_space_offset(data);
    let end = offset as usize + raw.len();
    data[offset as usize..end].copy_from_slice(raw);
    page_x_set_free_space_offset(data, end as u16);
    offset
}

/// Writes `raw` at a fixed `offset`, used by crash recovery for both redo
/// and undo of inserts and updates; bumps the free-space offset forward
/// if this write extends past it (recovering an insert that was never
/// followed by a later one).
pub fn page_x_recover_write(data: &mut [u8], raw: &[u8], offset: u16) {
    let end = offset as usize + raw.len();
    data[offset as usize..end].copy_from_slice(raw);
    if page_x_free_space_offset(data) < end as u16 {
        page_x_set_free_space_offset(data, end as u16);
    }
}
