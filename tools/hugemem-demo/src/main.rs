mod args;
mod logger;

use crate::args::{Args, ArgsError, Command, USAGE};
use crate::logger::StderrLogger;
use hugemem_addresses::{PageSize, Size2M};
use hugemem_device::{
    DeviceError, GET_PHYS_ADDR, HugePageModule, ModuleError, Protection, into_return,
};
use hugemem_info::device::DEVICE_NAME;
use hugemem_info::memory::PAGE_SIZE;
use hugemem_region::RegionError;
use hugemem_sim::{AccessFault, ClientAddressSpace, MemoryError, PhysicalMemory, SimRegistry};
use log::{error, info};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

type Module = HugePageModule<Arc<PhysicalMemory>, SimRegistry>;

/// What the dump client maps: one 2 MiB huge page.
const DUMP_LEN: u64 = Size2M::SIZE;

/// `u64` indices the dump client reads.
const DUMP_WORDS: [u64; 4] = [0x5000, 0x5004, 0x5008, 0x5012];

const PATTERN: u64 = 0xDEAD_BEEF;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("simulated memory: {0}")]
    Memory(#[from] MemoryError),
    #[error("module: {0}")]
    Module(#[from] ModuleError),
    #[error("{0} ({errno})", errno = .0.errno())]
    Device(#[from] DeviceError),
    #[error("client access: {0}")]
    Access(#[from] AccessFault),
    #[error("wrote {wrote:#x}, read back {read:#x}")]
    Mismatch { wrote: u64, read: u64 },
}

fn main() -> ExitCode {
    let args = match Args::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(ArgsError::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("{err}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = StderrLogger::new(args.level).init() {
        eprintln!("failed to install logger: {err}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), DemoError> {
    let region = args.config.region()?;
    let memory = Arc::new(PhysicalMemory::new(region.physical_base(), region.size())?);
    let mut module = HugePageModule::load(Arc::clone(&memory), args.config, SimRegistry::new())?;
    info!("simulating {} backed by {memory:?}", module.node().path());
    if let Some((number, _)) = module.registry().lookup(DEVICE_NAME) {
        info!("{DEVICE_NAME} registered as {number}");
    }

    match args.command {
        Command::Phys => read_phys(&module)?,
        Command::Dump => read_huge(&module, &memory)?,
        Command::RoundTrip => round_trip(&module, &memory)?,
        Command::All => {
            read_phys(&module)?;
            round_trip(&module, &memory)?;
            read_huge(&module, &memory)?;
        }
    }

    module.unload()?;
    Ok(())
}

/// Open the device and ask it where the region lives.
fn read_phys(module: &Module) -> Result<(), DemoError> {
    let session = module.open();

    let mut phys_addr = [0u8; 8];
    let result = session.ioctl(GET_PHYS_ADDR.into_bits(), &mut phys_addr);
    if let Err(err) = result {
        error!("ioctl IOCTL_GET_PHYS_ADDR returned {}", into_return(result));
        return Err(err.into());
    }

    println!(
        "Huge page physical address: {:#x}",
        u64::from_le_bytes(phys_addr)
    );
    Ok(())
}

/// Map a huge page worth of the region and print a few words from it.
fn read_huge(module: &Module, memory: &Arc<PhysicalMemory>) -> Result<(), DemoError> {
    let session = module.open();
    let mut space = ClientAddressSpace::new(Arc::clone(memory));

    let len = DUMP_LEN.min(memory.size());
    let mapping = space.mmap(&session, len, Protection::READ_WRITE, 0)?;
    println!("Huge page mapped at virtual address: {}", mapping.start());

    let dumped = DUMP_WORDS.iter().try_for_each(|&index| {
        let offset = index * 8;
        if offset + 8 > mapping.len() {
            println!("word {index:#x}: outside the {len:#x}-byte mapping");
            return Ok(());
        }
        let value = space.read_u64(mapping.start() + offset)?;
        println!("word {index:#x}: {value:#018X}");
        Ok::<_, AccessFault>(())
    });

    // unmap even when a read faulted
    space.munmap(mapping)?;
    dumped?;
    Ok(())
}

/// Write through one client, then read back through another.
fn round_trip(module: &Module, memory: &Arc<PhysicalMemory>) -> Result<(), DemoError> {
    {
        let mut writer = ClientAddressSpace::new(Arc::clone(memory));
        let mut session = module.open();
        let mapping = writer.mmap(&session, PAGE_SIZE, Protection::READ_WRITE, 0)?;
        writer.write_u64(mapping.start(), PATTERN)?;
        println!("wrote {PATTERN:#x} at {}", mapping.start());
        session.release()?;
        writer.munmap(mapping)?;
    }

    let mut reader = ClientAddressSpace::new(Arc::clone(memory));
    let session = module.open();
    let mapping = reader.mmap(&session, PAGE_SIZE, Protection::READ, 0)?;
    let read = reader.read_u64(mapping.start())?;
    println!("read {read:#x} at {}", mapping.start());
    reader.munmap(mapping)?;

    if read == PATTERN {
        Ok(())
    } else {
        Err(DemoError::Mismatch {
            wrote: PATTERN,
            read,
        })
    }
}
