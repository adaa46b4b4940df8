//! The device: family, name interner and registered BEL types.

use crate::ids::BelTypeId;
use crate::types::{BelPinTemplate, BelType, DeviceFamily, PinDirection, PinTemplateRef};
use kestrel_common::{Ident, Interner};

/// Device-wide data shared by every cluster template of the device.
#[derive(Debug)]
pub struct Device {
    family: DeviceFamily,
    interner: Interner,
    bel_types: Vec<BelType>,
}

impl Device {
    /// Creates an empty device of the given family.
    pub fn new(family: DeviceFamily) -> Self {
        Self {
            family,
            interner: Interner::new(),
            bel_types: Vec::new(),
        }
    }

    /// Returns the device family.
    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// Returns the name interner.
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Interns a name.
    pub fn intern(&self, name: &str) -> Ident {
        self.interner.get_or_intern(name)
    }

    /// Resolves an interned name.
    pub fn name(&self, ident: Ident) -> &str {
        self.interner.resolve(ident)
    }

    /// Registers a BEL type and returns its ID.
    pub fn add_bel_type(&mut self, name: &str, pins: Vec<BelPinTemplate>) -> BelTypeId {
        let id = BelTypeId::from_raw(self.bel_types.len() as u32);
        let name = self.intern(name);
        self.bel_types.push(BelType { name, pins });
        id
    }

    /// Builds a pin template, interning its name.
    ///
    /// `general_fabric` sets `drives_general_fabric` on source pins and
    /// `driven_by_general_fabric` on sink pins.
    pub fn pin(&self, name: &str, direction: PinDirection, general_fabric: bool) -> BelPinTemplate {
        BelPinTemplate {
            name: self.intern(name),
            direction,
            drives_general_fabric: general_fabric && direction.is_source(),
            driven_by_general_fabric: general_fabric && direction.is_sink(),
        }
    }

    /// Returns a registered BEL type.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not returned by [`Device::add_bel_type`].
    pub fn bel_type(&self, id: BelTypeId) -> &BelType {
        &self.bel_types[id.index()]
    }

    /// Returns all registered BEL types with their IDs.
    pub fn bel_types(&self) -> impl Iterator<Item = (BelTypeId, &BelType)> {
        self.bel_types
            .iter()
            .enumerate()
            .map(|(i, t)| (BelTypeId::from_raw(i as u32), t))
    }

    /// Looks up a BEL type by name.
    pub fn bel_type_by_name(&self, name: &str) -> Option<BelTypeId> {
        let name = self.interner.get(name)?;
        self.bel_types()
            .find(|(_, t)| t.name == name)
            .map(|(id, _)| id)
    }

    /// Resolves a pin template reference.
    pub fn pin_template(&self, pin: PinTemplateRef) -> Option<&BelPinTemplate> {
        self.bel_types.get(pin.bel_type.index())?.pin(pin.pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lut_device() -> (Device, BelTypeId) {
        let mut device = Device::new(DeviceFamily::Generic);
        let pins = vec![
            device.pin("A1", PinDirection::In, true),
            device.pin("O6", PinDirection::Out, true),
        ];
        let lut = device.add_bel_type("LUT6", pins);
        (device, lut)
    }

    #[test]
    fn registered_type_is_found_by_name() {
        let (device, lut) = lut_device();
        assert_eq!(device.bel_type_by_name("LUT6"), Some(lut));
        assert_eq!(device.bel_type_by_name("FF"), None);
    }

    #[test]
    fn general_fabric_flag_follows_direction() {
        let (device, lut) = lut_device();
        let a1 = PinTemplateRef {
            bel_type: lut,
            pin: device.intern("A1"),
        };
        let o6 = PinTemplateRef {
            bel_type: lut,
            pin: device.intern("O6"),
        };
        let a1 = device.pin_template(a1).unwrap();
        assert!(a1.driven_by_general_fabric && !a1.drives_general_fabric);
        let o6 = device.pin_template(o6).unwrap();
        assert!(o6.drives_general_fabric && !o6.driven_by_general_fabric);
    }

    #[test]
    fn unknown_pin_template_is_none() {
        let (device, lut) = lut_device();
        let missing = PinTemplateRef {
            bel_type: lut,
            pin: device.intern("A9"),
        };
        assert!(device.pin_template(missing).is_none());
    }
}
