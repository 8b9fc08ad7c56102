use hugemem_addresses::{PageFrameNumber, PageOrder, PhysicalAddress, Size4K, VirtualAddress};
use hugemem_device::{
    CharDevRegistry, DeviceError, DeviceNode, Errno, ErrorKind, GET_PHYS_ADDR, HugePageDevice,
    HugePageModule, ModuleError, Protection, RegistryError, RemapError, SessionState,
    UserAddressSpace, Vma, into_return,
};
use hugemem_region::{ActiveMapping, IoRemap, MappingLease, RegionConfig, ReservedRegion};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const BASE: u64 = 0x8_5700_0000;
const SIZE: u64 = 4 << 20;

/// Hands out leaked heap memory and counts unmaps.
#[derive(Default)]
struct CountingRemap {
    unmapped: AtomicUsize,
    refuse: bool,
}

impl CountingRemap {
    fn unmapped(&self) -> usize {
        self.unmapped.load(Ordering::SeqCst)
    }
}

impl IoRemap for CountingRemap {
    fn ioremap(&self, _pa: PhysicalAddress, size: u64) -> Option<NonNull<u8>> {
        if self.refuse {
            return None;
        }
        let memory = Box::leak(vec![0u8; usize::try_from(size).ok()?].into_boxed_slice());
        NonNull::new(memory.as_mut_ptr())
    }

    unsafe fn iounmap(&self, _handle: NonNull<u8>, _size: u64) {
        self.unmapped.fetch_add(1, Ordering::SeqCst);
    }
}

/// One translation the device asked for, with the lease it came with.
struct Installed {
    start: VirtualAddress,
    pfn: PageFrameNumber<Size4K>,
    len: u64,
    prot: Protection,
    _lease: MappingLease,
}

/// Records what the device asked to install.
#[derive(Default)]
struct RecordingSpace {
    installed: Vec<Installed>,
    refuse: Option<RemapError>,
}

impl UserAddressSpace for RecordingSpace {
    fn remap_pfn_range(
        &mut self,
        start: VirtualAddress,
        pfn: PageFrameNumber<Size4K>,
        len: u64,
        prot: Protection,
        lease: MappingLease,
    ) -> Result<(), RemapError> {
        if let Some(err) = self.refuse {
            return Err(err);
        }
        self.installed.push(Installed {
            start,
            pfn,
            len,
            prot,
            _lease: lease,
        });
        Ok(())
    }
}

struct NullRegistry {
    fail: Option<RegistryError>,
    live: Vec<&'static str>,
}

impl CharDevRegistry for NullRegistry {
    type Handle = &'static str;

    fn register(&mut self, node: &DeviceNode) -> Result<Self::Handle, RegistryError> {
        if let Some(err) = self.fail {
            return Err(err);
        }
        self.live.push(node.name);
        Ok(node.name)
    }

    fn unregister(&mut self, handle: Self::Handle) {
        self.live.retain(|name| *name != handle);
    }
}

fn live_device(remap: &CountingRemap) -> HugePageDevice<&CountingRemap> {
    let region = ReservedRegion::new(PhysicalAddress::new(BASE), PageOrder::new(10)).unwrap();
    HugePageDevice::from_mapping(ActiveMapping::initialize(remap, region).unwrap())
}

fn vma(len: u64) -> Vma {
    Vma::new(VirtualAddress::new(0x7f00_0000_0000), len, Protection::READ_WRITE)
}

#[test]
fn query_reports_the_physical_base() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);

    let session = device.open();
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(
        session.query_physical_address(),
        Ok(PhysicalAddress::new(BASE))
    );
}

#[test]
fn concurrent_sessions_see_the_same_base() {
    let threads = 8;
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let start = Barrier::new(threads);

    thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    let session = device.open();
                    start.wait();
                    (0..1_000)
                        .map(|_| session.query_physical_address().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            let seen = handle.join().unwrap();
            assert!(seen.iter().all(|pa| pa.as_u64() == BASE));
        }
    });

    assert_eq!(device.open_sessions(), 0);
}

#[test]
fn queries_outside_the_live_window_are_not_ready() {
    let remap = CountingRemap::default();
    let device = HugePageDevice::<&CountingRemap>::new();

    {
        let session = device.open();
        let err = session.query_physical_address().unwrap_err();
        assert_eq!(err, DeviceError::NotReady);
        assert_eq!(err.errno(), Errno::ENODEV);
    }

    let region = RegionConfig::default().region().unwrap();
    device
        .install(ActiveMapping::initialize(&remap, region).unwrap())
        .unwrap();
    assert!(device.is_ready());
    device.teardown().unwrap();
    assert!(!device.is_ready());

    let session = device.open();
    assert_eq!(
        session.query_physical_address(),
        Err(DeviceError::NotReady)
    );
}

#[test]
fn ioctl_copies_the_base_out() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let session = device.open();

    let mut reply = [0u8; 8];
    session.ioctl(GET_PHYS_ADDR.into_bits(), &mut reply).unwrap();
    assert_eq!(u64::from_le_bytes(reply), BASE);

    let mut short = [0u8; 4];
    let err = session
        .ioctl(GET_PHYS_ADDR.into_bits(), &mut short)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadTransfer);
    assert_eq!(into_return(Err(err)), -14);

    let mut null: Option<&mut [u8]> = None;
    assert_eq!(
        session
            .ioctl(GET_PHYS_ADDR.into_bits(), &mut null)
            .map_err(|e| e.errno()),
        Err(Errno::EFAULT)
    );

    let err = session.ioctl(0x1234, &mut reply).unwrap_err();
    assert_eq!(err.errno(), Errno::ENOTTY);
}

#[test]
fn mapping_installs_region_frames() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let session = device.open();
    let mut space = RecordingSpace::default();

    let mapping = session.establish_mapping(&mut space, &vma(4096)).unwrap();
    assert_eq!(mapping.first_frame().as_u64(), BASE >> 12);
    assert_eq!(mapping.physical_start().as_u64(), BASE);
    assert_eq!(mapping.len(), 4096);
    assert_eq!(space.installed.len(), 1);
    assert_eq!(space.installed[0].start, mapping.start());
    assert_eq!(space.installed[0].pfn.as_u64(), 0x85_7000);
    assert_eq!(space.installed[0].len, 4096);
    assert_eq!(space.installed[0].prot, Protection::READ_WRITE);

    let whole = session.establish_mapping(&mut space, &vma(SIZE)).unwrap();
    assert_eq!(whole.len(), SIZE);

    let tail = session
        .establish_mapping(&mut space, &vma(4096).with_page_offset(1023))
        .unwrap();
    assert_eq!(tail.first_frame().as_u64(), 0x85_73FF);

    assert_eq!(device.outstanding_mappings(), 3);
    space.installed.clear();
    assert_eq!(device.outstanding_mappings(), 0);
}

#[test]
fn partial_pages_are_rounded_up() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let session = device.open();
    let mut space = RecordingSpace::default();

    let small = session.establish_mapping(&mut space, &vma(100)).unwrap();
    assert_eq!(small.len(), 4096);
    assert_eq!(small.physical_start().as_u64(), BASE);
    assert_eq!(space.installed[0].len, 4096);

    let almost = session.establish_mapping(&mut space, &vma(SIZE - 1)).unwrap();
    assert_eq!(almost.len(), SIZE);
    assert_eq!(space.installed[1].len, SIZE);

    // the rounded length has to fit as well
    let err = session
        .establish_mapping(&mut space, &vma(100).with_page_offset(1024))
        .unwrap_err();
    assert!(matches!(err, DeviceError::TooLong { requested: 100, .. }));

    let err = session
        .establish_mapping(&mut space, &vma(u64::MAX))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(space.installed.len(), 2);
}

#[test]
fn oversized_requests_map_nothing() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let session = device.open();
    let mut space = RecordingSpace::default();

    let err = session
        .establish_mapping(&mut space, &vma(SIZE + 4096))
        .unwrap_err();
    assert_eq!(err.errno(), Errno::EINVAL);

    let err = session
        .establish_mapping(&mut space, &vma(8192).with_page_offset(1023))
        .unwrap_err();
    assert!(matches!(err, DeviceError::TooLong { offset: 1023, .. }));

    let err = session
        .establish_mapping(&mut space, &vma(4096).with_page_offset(u64::MAX))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(
        session.establish_mapping(&mut space, &vma(0)).unwrap_err(),
        DeviceError::EmptyRange
    );

    assert!(space.installed.is_empty());
    assert_eq!(device.outstanding_mappings(), 0);
}

#[test]
fn refused_installs_are_rejections() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let session = device.open();
    let refusal = RemapError::Overlaps {
        start: VirtualAddress::new(0x7f00_0000_0000),
        len: 4096,
    };
    let mut space = RecordingSpace {
        refuse: Some(refusal),
        ..RecordingSpace::default()
    };

    let err = session.establish_mapping(&mut space, &vma(4096)).unwrap_err();
    assert_eq!(err, DeviceError::MappingRejected(refusal));
    assert_eq!(err.errno(), Errno::EAGAIN);
    assert_eq!(device.outstanding_mappings(), 0);
}

#[test]
fn release_is_once_and_keeps_mappings() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let mut space = RecordingSpace::default();

    let mut session = device.open();
    let mapping = session.establish_mapping(&mut space, &vma(4096)).unwrap();
    assert_eq!(device.open_sessions(), 1);

    session.release().unwrap();
    assert_eq!(session.state(), SessionState::Released);
    assert_eq!(device.open_sessions(), 0);

    let err = session.release().unwrap_err();
    assert_eq!(err, DeviceError::SessionClosed);
    assert_eq!(err.errno(), Errno::EBADF);
    assert_eq!(
        session.query_physical_address(),
        Err(DeviceError::SessionClosed)
    );

    // the region mapping is untouched by the release
    assert_eq!(mapping.first_frame().as_u64(), BASE >> 12);
    assert_eq!(device.outstanding_mappings(), 1);
    drop(session);
    assert_eq!(device.open_sessions(), 0);
}

#[test]
fn teardown_waits_for_sessions_and_mappings() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);
    let mut space = RecordingSpace::default();

    let session = device.open();
    assert_eq!(
        device.teardown(),
        Err(DeviceError::Busy {
            sessions: 1,
            mappings: 0
        })
    );

    let mapping = session.establish_mapping(&mut space, &vma(4096)).unwrap();
    drop(session);
    let err = device.teardown().unwrap_err();
    assert_eq!(
        err,
        DeviceError::Busy {
            sessions: 0,
            mappings: 1
        }
    );
    assert_eq!(err.errno(), Errno::EBUSY);
    assert!(device.is_ready());
    assert_eq!(remap.unmapped(), 0);

    // the handle is only a description; the installed translation is the hold
    assert_eq!(mapping.len(), 4096);
    assert!(device.teardown().is_err());

    space.installed.clear();
    device.teardown().unwrap();
    assert_eq!(remap.unmapped(), 1);
    assert_eq!(device.teardown(), Err(DeviceError::NotReady));
}

#[test]
fn second_install_is_rejected() {
    let remap = CountingRemap::default();
    let device = live_device(&remap);

    let region = RegionConfig::default().region().unwrap();
    let again = ActiveMapping::initialize(&remap, region).unwrap();
    assert_eq!(device.install(again), Err(DeviceError::AlreadyInitialized));
    // the rejected mapping was released, the live one was not
    assert_eq!(remap.unmapped(), 1);
    assert!(device.is_ready());
}

#[test]
fn module_load_and_unload() {
    let remap = Arc::new(CountingRemap::default());
    let registry = NullRegistry {
        fail: None,
        live: Vec::new(),
    };

    let mut module =
        HugePageModule::load(Arc::clone(&remap), RegionConfig::default(), registry).unwrap();
    assert_eq!(module.node().path(), "/dev/hugepage_dev");
    assert_eq!(module.node().class, "huge");
    assert_eq!(module.registry().live, ["hugepage_dev"]);

    let mut space = RecordingSpace::default();
    let mapping = {
        let session = module.open();
        assert_eq!(session.query_physical_address().unwrap().as_u64(), BASE);
        session.establish_mapping(&mut space, &vma(4096)).unwrap()
    };

    let err = module.unload().unwrap_err();
    assert!(matches!(err, ModuleError::Device(DeviceError::Busy { .. })));
    assert!(module.is_loaded());

    assert_eq!(mapping.len(), 4096);
    drop(space);
    module.unload().unwrap();
    assert!(!module.is_loaded());
    assert!(module.registry().live.is_empty());
    assert_eq!(remap.unmapped(), 1);
}

#[test]
fn module_load_unwinds_on_failure() {
    let remap = Arc::new(CountingRemap::default());
    let registry = NullRegistry {
        fail: Some(RegistryError::NodeExists("hugepage_dev")),
        live: Vec::new(),
    };

    let err = HugePageModule::load(Arc::clone(&remap), RegionConfig::default(), registry)
        .unwrap_err();
    assert!(matches!(err, ModuleError::Registry(_)));
    assert_eq!(err.errno(), Errno::EEXIST);
    assert_eq!(remap.unmapped(), 1);

    let refusing = CountingRemap {
        refuse: true,
        ..CountingRemap::default()
    };
    let registry = NullRegistry {
        fail: None,
        live: Vec::new(),
    };
    let err = HugePageModule::load(&refusing, RegionConfig::default(), registry).unwrap_err();
    assert_eq!(err.errno(), Errno::ENOMEM);

    let bad = RegionConfig {
        physical_base: BASE + 0x800,
        size_order: 10,
    };
    let registry = NullRegistry {
        fail: None,
        live: Vec::new(),
    };
    let err = HugePageModule::load(&refusing, bad, registry).unwrap_err();
    assert!(matches!(err, ModuleError::Region(_)));
    assert_eq!(err.errno(), Errno::EINVAL);
}
