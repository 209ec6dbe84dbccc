use crate::ir::{AddressSpace, Type};
use crate::module::{GlobalVar, Module, DEVICE_TRIPLE};
use crate::test_helpers::diamond;

#[test]
fn prints_diamond() {
    let text = diamond().to_string();
    let expected = "\
define void @diamond(i32 %n) {
entry:
  %c = icmp slt i32 %n, 4
  br i1 %c, label %then, label %else

then:
  %x = add i32 %n, 1
  br label %join

else:
  %y = add i32 %n, 2
  br label %join

join:
  %m = phi i32 [ %x, %then ], [ %y, %else ]
  ret void
}
";
    pretty_assertions::assert_eq!(text, expected);
}

#[test]
fn module_header_lists_globals_and_annotations() {
    let mut module = Module::new("m", DEVICE_TRIPLE);
    module.add_global(GlobalVar {
        name: "tile".to_owned(),
        ty: Type::F32,
        len: 64,
        address_space: AddressSpace::Shared,
    });
    module.add_function(diamond());
    module.annotate("diamond", "kernel", 1);

    let text = module.to_string();
    assert!(text.contains("target triple = \"nvptx64-nvidia-cuda\""));
    assert!(text.contains("@tile = addrspace(3) global [64 x float] undef"));
    assert!(text.contains("; annotation @diamond !\"kernel\" 1"));
}
