//! PCI address helpers for SR-IOV virtual functions

/// Derive the physical-function address owning a virtual function
///
/// Virtual functions of a two-port SR-IOV NIC are laid out as consecutive
/// addresses alternating between the two physical functions, so the owner
/// is found by zeroing the slot and reducing the function modulo 2:
/// `0000:81:10.3` belongs to `0000:81:00.1`.
///
/// Returns `None` if the address is not of the form `domain:bus:slot.function`.
pub fn physical_function_address(vf_address: &str) -> Option<String> {
    let mut parts = vf_address.trim().split(':');
    let domain = parts.next()?;
    let bus = parts.next()?;
    let slot_function = parts.next()?;
    if parts.next().is_some() || domain.is_empty() || bus.is_empty() {
        return None;
    }

    let (slot, function) = slot_function.split_once('.')?;
    if slot.is_empty() {
        return None;
    }
    let function: u8 = function.parse().ok()?;

    Some(format!("{}:{}:00.{}", domain, bus, function % 2))
}
