//! Wire structures for the filesystem information procedures: FSSTAT,
//! FSINFO and PATHCONF (RFC 1813 sections 3.3.18 through 3.3.20).

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use super::*;

/// The file system supports hard links.
pub const FSF_LINK: u32 = 0x0001;
/// The file system supports symbolic links.
pub const FSF_SYMLINK: u32 = 0x0002;
/// PATHCONF results are identical across the whole file system.
pub const FSF_HOMOGENEOUS: u32 = 0x0008;
/// SETATTR can set file times to the advertised resolution.
pub const FSF_CANSETTIME: u32 = 0x0010;

/// FSSTAT success body: dynamic usage counters.
#[derive(Clone, Debug, Default)]
pub struct FSSTAT3resok {
    pub obj_attributes: post_op_attr,
    pub tbytes: size3,
    pub fbytes: size3,
    pub abytes: size3,
    pub tfiles: size3,
    pub ffiles: size3,
    pub afiles: size3,
    /// Seconds for which this information stays valid; zero means
    /// always.
    pub invarsec: u32,
}
DeserializeStruct!(
    FSSTAT3resok,
    obj_attributes,
    tbytes,
    fbytes,
    abytes,
    tfiles,
    ffiles,
    afiles,
    invarsec
);
SerializeStruct!(
    FSSTAT3resok,
    obj_attributes,
    tbytes,
    fbytes,
    abytes,
    tfiles,
    ffiles,
    afiles,
    invarsec
);

/// FSINFO success body: static capabilities of the file system.
#[derive(Clone, Debug, Default)]
pub struct FSINFO3resok {
    pub obj_attributes: post_op_attr,
    pub rtmax: u32,
    pub rtpref: u32,
    pub rtmult: u32,
    pub wtmax: u32,
    pub wtpref: u32,
    pub wtmult: u32,
    pub dtpref: u32,
    pub maxfilesize: size3,
    /// Granularity of the file times the server maintains.
    pub time_delta: nfstime3,
    /// Bit mask of `FSF_*` properties.
    pub properties: u32,
}
DeserializeStruct!(
    FSINFO3resok,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);
SerializeStruct!(
    FSINFO3resok,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);

/// PATHCONF success body.
#[derive(Clone, Debug, Default)]
pub struct PATHCONF3resok {
    pub obj_attributes: post_op_attr,
    pub linkmax: u32,
    pub name_max: u32,
    pub no_trunc: bool,
    pub chown_restricted: bool,
    pub case_insensitive: bool,
    pub case_preserving: bool,
}
DeserializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
SerializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
