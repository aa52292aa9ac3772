use touchkey_keyboard::{Access, Attribute};

pub fn run() {
    println!("{:<28} ACCESS", "ATTRIBUTE");
    for attr in Attribute::all() {
        let access = match attr.access() {
            Access::ReadOnly => "r",
            Access::WriteOnly => "w",
            Access::ReadWrite => "rw",
        };
        println!("{:<28} {}", attr.name(), access);
    }
}
