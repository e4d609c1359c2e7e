use ash::vk;

/// Queue family indices chosen for a physical device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub transfer: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Sorted and deduplicated, one entry per `vk::DeviceQueueCreateInfo`
    pub fn unique(&self) -> Vec<u32> {
        let mut indices = vec![self.graphics, self.transfer, self.present];
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Visits families in order, giving each family to the first role it can fill
/// (graphics, then transfer, then present). Transfer falls back to the graphics family and present
/// falls back to the first family supporting the surface.
///
/// Returns `None` if no graphics or present capable family exists.
pub fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilyIndices> {
    let mut graphics = None;
    let mut transfer = None;
    let mut present = None;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        } else if transfer.is_none() && family.queue_flags.contains(vk::QueueFlags::TRANSFER) {
            transfer = Some(index);
        } else if present.is_none() && supports_present(index) {
            present = Some(index);
        }

        if graphics.is_some() && transfer.is_some() && present.is_some() {
            break;
        }
    }

    let graphics = graphics?;
    // graphics queues implicitly support transfer operations
    let transfer = transfer.unwrap_or(graphics);
    let present = match present {
        Some(p) => p,
        None => (0..families.len() as u32).find(|&i| supports_present(i))?,
    };

    Some(QueueFamilyIndices {
        graphics,
        transfer,
        present,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(queue_flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    const ALL: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn single_universal_family() {
        let families = [family(ALL)];
        let indices = select_queue_families(&families, |_| true).unwrap();
        assert_eq!(
            indices,
            QueueFamilyIndices {
                graphics: 0,
                transfer: 0,
                present: 0,
            }
        );
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn dedicated_transfer_and_present_families() {
        let families = [
            family(ALL),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = select_queue_families(&families, |i| i == 2).unwrap();
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.transfer, 1);
        assert_eq!(indices.present, 2);
        assert_eq!(indices.unique(), vec![0, 1, 2]);
    }

    #[test]
    fn present_falls_back_to_first_supporting_family() {
        // family 0 is taken by graphics so the loop never assigns present to it
        let families = [family(ALL), family(vk::QueueFlags::TRANSFER)];
        let indices = select_queue_families(&families, |i| i == 0).unwrap();
        assert_eq!(indices.present, 0);
        assert_eq!(indices.transfer, 1);
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn unsatisfiable_requirements() {
        let compute_only = [family(vk::QueueFlags::COMPUTE)];
        assert_eq!(select_queue_families(&compute_only, |_| true), None);

        let no_present = [family(ALL)];
        assert_eq!(select_queue_families(&no_present, |_| false), None);

        assert_eq!(select_queue_families(&[], |_| true), None);
    }
}
