//! Device, configuration, and string descriptors
//!
//! Every builder writes a complete descriptor into the caller's buffer, or
//! nothing at all. Clipping a reply to the host's `wLength` is the caller's
//! job.
//!
//! The device presents itself as a Miscellaneous / Interface Association
//! device (class 0xEF, subclass 0x02, protocol 0x01), and the configuration
//! descriptor groups the two CDC interfaces with an interface association
//! descriptor.

use crate::{
    config::Identity,
    endpoint::{self, EndpointConfig, CONTROL_MAX_PACKET_SIZE},
};
use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use zerocopy::{AsBytes, Unaligned, U16};

/// Descriptor assembly errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DescriptorError {
    /// The destination can't hold the complete descriptor
    BufferTooSmall { required: usize },
    /// No string has this index
    InvalidIndex(u8),
    /// The string doesn't fit in a 255 byte descriptor
    StringTooLong,
}

/// `bDescriptorType` values
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfiguration = 0x07,
    InterfacePower = 0x08,
    InterfaceAssociation = 0x0B,
    Bos = 0x0F,
    CsInterface = 0x24,
    CsEndpoint = 0x25,
}

/// `bcdUSB`
pub const USB_RELEASE: u16 = 0x0200;

/// Miscellaneous device class, with interface association descriptors
pub const DEVICE_CLASS: u8 = 0xEF;
pub const DEVICE_SUBCLASS: u8 = 0x02;
pub const DEVICE_PROTOCOL: u8 = 0x01;

pub const CDC_CLASS: u8 = 0x02;
pub const CDC_SUBCLASS_ACM: u8 = 0x02;
pub const CDC_DATA_CLASS: u8 = 0x0A;

/// `bcdCDC`
pub const CDC_RELEASE: u16 = 0x0110;

/// Interface number of the CDC communication interface
pub const COMM_INTERFACE: u8 = 0;
/// Interface number of the CDC data interface
pub const DATA_INTERFACE: u8 = 1;

/// The only configuration
pub const CONFIGURATION_VALUE: u8 = 1;

/// Self powered
const CONFIGURATION_ATTRIBUTES: u8 = 0xC0;
/// 100mA, in 2mA units
const MAX_POWER: u8 = 0x32;

/// SET_LINE_CODING, GET_LINE_CODING, SET_CONTROL_LINE_STATE, SERIAL_STATE
const ACM_CAPABILITIES: u8 = 0x02;
/// Device handles call management itself
const CALL_MANAGEMENT_CAPABILITIES: u8 = 0x01;

const CDC_HEADER: u8 = 0x00;
const CDC_CALL_MANAGEMENT: u8 = 0x01;
const CDC_ACM: u8 = 0x02;
const CDC_UNION: u8 = 0x06;

/// English (United States)
const LANGUAGE_ID: u16 = 0x0409;

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct DeviceDescriptor {
    length: u8,
    descriptor_type: u8,
    usb_release: U16<LittleEndian>,
    class: u8,
    subclass: u8,
    protocol: u8,
    max_packet_size_0: u8,
    vendor_id: U16<LittleEndian>,
    product_id: U16<LittleEndian>,
    device_release: U16<LittleEndian>,
    manufacturer: u8,
    product: u8,
    serial_number: u8,
    num_configurations: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct QualifierDescriptor {
    length: u8,
    descriptor_type: u8,
    usb_release: U16<LittleEndian>,
    class: u8,
    subclass: u8,
    protocol: u8,
    max_packet_size_0: u8,
    num_configurations: u8,
    reserved: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct ConfigurationHeader {
    length: u8,
    descriptor_type: u8,
    total_length: U16<LittleEndian>,
    num_interfaces: u8,
    configuration_value: u8,
    configuration: u8,
    attributes: u8,
    max_power: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct InterfaceAssociation {
    length: u8,
    descriptor_type: u8,
    first_interface: u8,
    interface_count: u8,
    function_class: u8,
    function_subclass: u8,
    function_protocol: u8,
    function: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct InterfaceDescriptor {
    length: u8,
    descriptor_type: u8,
    interface_number: u8,
    alternate_setting: u8,
    num_endpoints: u8,
    class: u8,
    subclass: u8,
    protocol: u8,
    interface: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct CdcHeaderDescriptor {
    length: u8,
    descriptor_type: u8,
    subtype: u8,
    cdc_release: U16<LittleEndian>,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct CallManagementDescriptor {
    length: u8,
    descriptor_type: u8,
    subtype: u8,
    capabilities: u8,
    data_interface: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct AcmDescriptor {
    length: u8,
    descriptor_type: u8,
    subtype: u8,
    capabilities: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct UnionDescriptor {
    length: u8,
    descriptor_type: u8,
    subtype: u8,
    control_interface: u8,
    subordinate_interface: u8,
}

#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct EndpointDescriptor {
    length: u8,
    descriptor_type: u8,
    address: u8,
    attributes: u8,
    max_packet_size: U16<LittleEndian>,
    interval: u8,
}

/// The complete configuration descriptor, in wire order
#[repr(C)]
#[derive(Debug, AsBytes, Unaligned)]
struct CdcConfiguration {
    header: ConfigurationHeader,
    association: InterfaceAssociation,
    comm_interface: InterfaceDescriptor,
    cdc_header: CdcHeaderDescriptor,
    call_management: CallManagementDescriptor,
    acm: AcmDescriptor,
    union: UnionDescriptor,
    notify: EndpointDescriptor,
    data_interface: InterfaceDescriptor,
    data_out: EndpointDescriptor,
    data_in: EndpointDescriptor,
}

/// Size of the device descriptor
pub const DEVICE_LENGTH: usize = core::mem::size_of::<DeviceDescriptor>();
/// Size of the device qualifier descriptor
pub const QUALIFIER_LENGTH: usize = core::mem::size_of::<QualifierDescriptor>();
/// `wTotalLength` of the configuration descriptor
pub const CONFIGURATION_LENGTH: usize = core::mem::size_of::<CdcConfiguration>();

const _: [(); 1] = [(); (DEVICE_LENGTH == 18) as usize];
const _: [(); 1] = [(); (QUALIFIER_LENGTH == 10) as usize];
const _: [(); 1] = [(); (CONFIGURATION_LENGTH == 75) as usize];

/// Largest possible descriptor
pub const MAX_DESCRIPTOR_LENGTH: usize = 255;

fn le(value: u16) -> U16<LittleEndian> {
    U16::new(value)
}

/// Copy a complete descriptor into `buffer`, or nothing at all
fn emit(buffer: &mut [u8], bytes: &[u8]) -> Result<usize, DescriptorError> {
    let dst = buffer
        .get_mut(..bytes.len())
        .ok_or(DescriptorError::BufferTooSmall {
            required: bytes.len(),
        })?;
    dst.copy_from_slice(bytes);
    Ok(bytes.len())
}

/// Build the device descriptor
pub fn device(identity: &Identity, buffer: &mut [u8]) -> Result<usize, DescriptorError> {
    let descriptor = DeviceDescriptor {
        length: DEVICE_LENGTH as u8,
        descriptor_type: DescriptorType::Device as u8,
        usb_release: le(USB_RELEASE),
        class: DEVICE_CLASS,
        subclass: DEVICE_SUBCLASS,
        protocol: DEVICE_PROTOCOL,
        max_packet_size_0: CONTROL_MAX_PACKET_SIZE as u8,
        vendor_id: le(identity.vendor_id),
        product_id: le(identity.product_id),
        device_release: le(identity.device_release),
        manufacturer: Identity::MANUFACTURER,
        product: Identity::PRODUCT,
        serial_number: Identity::SERIAL_NUMBER,
        num_configurations: 1,
    };
    emit(buffer, descriptor.as_bytes())
}

/// Build the device qualifier descriptor
///
/// Describes the device as it would operate at the other speed, which is
/// the same device.
pub fn device_qualifier(buffer: &mut [u8]) -> Result<usize, DescriptorError> {
    let descriptor = QualifierDescriptor {
        length: QUALIFIER_LENGTH as u8,
        descriptor_type: DescriptorType::DeviceQualifier as u8,
        usb_release: le(USB_RELEASE),
        class: DEVICE_CLASS,
        subclass: DEVICE_SUBCLASS,
        protocol: DEVICE_PROTOCOL,
        max_packet_size_0: CONTROL_MAX_PACKET_SIZE as u8,
        num_configurations: 1,
        reserved: 0,
    };
    emit(buffer, descriptor.as_bytes())
}

fn endpoint_descriptor(ep: &EndpointConfig) -> EndpointDescriptor {
    EndpointDescriptor {
        length: core::mem::size_of::<EndpointDescriptor>() as u8,
        descriptor_type: DescriptorType::Endpoint as u8,
        address: ep.address,
        attributes: ep.kind as u8,
        max_packet_size: le(ep.max_packet_size),
        interval: ep.interval,
    }
}

fn interface_descriptor(
    number: u8,
    num_endpoints: u8,
    class: u8,
    subclass: u8,
    string: u8,
) -> InterfaceDescriptor {
    InterfaceDescriptor {
        length: core::mem::size_of::<InterfaceDescriptor>() as u8,
        descriptor_type: DescriptorType::Interface as u8,
        interface_number: number,
        alternate_setting: 0,
        num_endpoints,
        class,
        subclass,
        protocol: 0,
        interface: string,
    }
}

fn cdc_configuration() -> CdcConfiguration {
    CdcConfiguration {
        header: ConfigurationHeader {
            length: core::mem::size_of::<ConfigurationHeader>() as u8,
            descriptor_type: DescriptorType::Configuration as u8,
            total_length: le(CONFIGURATION_LENGTH as u16),
            num_interfaces: 2,
            configuration_value: CONFIGURATION_VALUE,
            configuration: Identity::CONFIGURATION,
            attributes: CONFIGURATION_ATTRIBUTES,
            max_power: MAX_POWER,
        },
        association: InterfaceAssociation {
            length: core::mem::size_of::<InterfaceAssociation>() as u8,
            descriptor_type: DescriptorType::InterfaceAssociation as u8,
            first_interface: COMM_INTERFACE,
            interface_count: 2,
            function_class: CDC_CLASS,
            function_subclass: CDC_SUBCLASS_ACM,
            function_protocol: 0,
            function: Identity::FUNCTION,
        },
        comm_interface: interface_descriptor(
            COMM_INTERFACE,
            1,
            CDC_CLASS,
            CDC_SUBCLASS_ACM,
            Identity::CONTROL_INTERFACE,
        ),
        cdc_header: CdcHeaderDescriptor {
            length: core::mem::size_of::<CdcHeaderDescriptor>() as u8,
            descriptor_type: DescriptorType::CsInterface as u8,
            subtype: CDC_HEADER,
            cdc_release: le(CDC_RELEASE),
        },
        call_management: CallManagementDescriptor {
            length: core::mem::size_of::<CallManagementDescriptor>() as u8,
            descriptor_type: DescriptorType::CsInterface as u8,
            subtype: CDC_CALL_MANAGEMENT,
            capabilities: CALL_MANAGEMENT_CAPABILITIES,
            data_interface: DATA_INTERFACE,
        },
        acm: AcmDescriptor {
            length: core::mem::size_of::<AcmDescriptor>() as u8,
            descriptor_type: DescriptorType::CsInterface as u8,
            subtype: CDC_ACM,
            capabilities: ACM_CAPABILITIES,
        },
        union: UnionDescriptor {
            length: core::mem::size_of::<UnionDescriptor>() as u8,
            descriptor_type: DescriptorType::CsInterface as u8,
            subtype: CDC_UNION,
            control_interface: COMM_INTERFACE,
            subordinate_interface: DATA_INTERFACE,
        },
        notify: endpoint_descriptor(&endpoint::NOTIFY_IN),
        data_interface: interface_descriptor(
            DATA_INTERFACE,
            2,
            CDC_DATA_CLASS,
            0,
            Identity::DATA_INTERFACE,
        ),
        data_out: endpoint_descriptor(&endpoint::DATA_OUT),
        data_in: endpoint_descriptor(&endpoint::DATA_IN),
    }
}

/// Build the configuration descriptor, with all interface, functional, and
/// endpoint descriptors
pub fn configuration(buffer: &mut [u8]) -> Result<usize, DescriptorError> {
    emit(buffer, cdc_configuration().as_bytes())
}

/// Build string descriptor `index`
///
/// Index 0 is the supported language list. Other indexes come from the
/// identity's string table, encoded as UTF-16LE.
pub fn string(identity: &Identity, index: u8, buffer: &mut [u8]) -> Result<usize, DescriptorError> {
    if index == 0 {
        let [lo, hi] = LANGUAGE_ID.to_le_bytes();
        return emit(buffer, &[4, DescriptorType::String as u8, lo, hi]);
    }

    let text = identity
        .string(index)
        .ok_or(DescriptorError::InvalidIndex(index))?;
    let length = 2 + 2 * text.encode_utf16().count();
    if length > MAX_DESCRIPTOR_LENGTH {
        return Err(DescriptorError::StringTooLong);
    }
    let dst = buffer
        .get_mut(..length)
        .ok_or(DescriptorError::BufferTooSmall { required: length })?;

    dst[0] = length as u8;
    dst[1] = DescriptorType::String as u8;
    for (unit, chunk) in text.encode_utf16().zip(dst[2..].chunks_exact_mut(2)) {
        chunk.copy_from_slice(&unit.to_le_bytes());
    }
    Ok(length)
}
